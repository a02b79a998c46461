//! LLM curation of the candidate set.
//!
//! The whole deduplicated set goes to the model in one prompt, numbered from 1.
//! The model answers with one decision per item it considered:
//!
//! ```json
//! [{"id": 3, "title": "...", "reasoning": "...", "is_relevant_news": true}]
//! ```
//!
//! Relevant decisions are projected back onto the candidates in the order the
//! model returned them. When the call fails, the whole input is passed through
//! as [`CurationResult::Unfiltered`], so a broken model over-publishes instead
//! of publishing nothing.

use crate::llm::{TextModel, TextRequest, generate_json};
use crate::models::{CandidateArticle, CuratedArticle};
use crate::retry::RetryPolicy;
use crate::utils::truncate_chars;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::{info, instrument, warn};

/// One decision returned by the curation model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurationDecision {
    /// 1-based item number from the prompt.
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reasoning: String,
    pub is_relevant_news: bool,
}

/// Outcome of curation.
#[derive(Debug, Clone, PartialEq)]
pub enum CurationResult {
    /// The model answered; these are the items it flagged relevant.
    Filtered(Vec<CuratedArticle>),
    /// The model call failed and the input was passed through.
    Unfiltered {
        articles: Vec<CuratedArticle>,
        reason: String,
    },
}

impl CurationResult {
    pub fn articles(&self) -> &[CuratedArticle] {
        match self {
            CurationResult::Filtered(articles) => articles,
            CurationResult::Unfiltered { articles, .. } => articles,
        }
    }

    pub fn into_articles(self) -> Vec<CuratedArticle> {
        match self {
            CurationResult::Filtered(articles) => articles,
            CurationResult::Unfiltered { articles, .. } => articles,
        }
    }

    /// The failure that caused a pass-through, if any.
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            CurationResult::Filtered(_) => None,
            CurationResult::Unfiltered { reason, .. } => Some(reason),
        }
    }
}

/// Structured-output schema for the decision list.
pub fn decision_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": {"type": "INTEGER", "description": "The original ID of the news item."},
                "title": {"type": "STRING", "description": "The title of the news item."},
                "reasoning": {"type": "STRING", "description": "Why the item was included or excluded."},
                "is_relevant_news": {"type": "BOOLEAN", "description": "True if this item is solid AI news."}
            },
            "required": ["id", "title", "reasoning", "is_relevant_news"],
            "propertyOrdering": ["id", "title", "reasoning", "is_relevant_news"]
        }
    })
}

/// Render the user prompt: previously published titles (if any), then every
/// candidate numbered from 1.
pub fn build_prompt(candidates: &[CandidateArticle], previous_titles: &[String]) -> String {
    let mut prompt = String::new();
    if !previous_titles.is_empty() {
        prompt.push_str("Previously published posts (reject items covering the same story):\n");
        for title in previous_titles {
            let _ = writeln!(prompt, "- {}", title);
        }
        prompt.push('\n');
    }
    for (i, item) in candidates.iter().enumerate() {
        let _ = writeln!(prompt, "News item {}:", i + 1);
        let _ = writeln!(prompt, "   Title: {}", item.title);
        let _ = writeln!(prompt, "   Description: {}", item.description);
        let _ = writeln!(prompt, "   Source: {}", item.source);
        prompt.push('\n');
    }
    prompt
}

/// Map relevant decisions back onto `candidates`, in decision order.
///
/// Out-of-range ids are logged and skipped. A second decision for an index
/// already taken is ignored.
pub fn project_decisions(
    decisions: &[CurationDecision],
    candidates: &[CandidateArticle],
) -> Vec<CuratedArticle> {
    let mut taken = HashSet::<usize>::new();
    let mut curated = Vec::new();

    for d in decisions {
        let title = truncate_chars(&d.title, 40);
        if !d.is_relevant_news {
            info!(id = d.id, title, reasoning = %d.reasoning, "EXCLUDED");
            continue;
        }
        let index = match usize::try_from(d.id) {
            Ok(id) if id >= 1 && id <= candidates.len() => id - 1,
            _ => {
                warn!(id = d.id, max = candidates.len(), "Model returned an invalid article id; skipping");
                continue;
            }
        };
        if !taken.insert(index) {
            warn!(id = d.id, "Duplicate decision for article; keeping the first");
            continue;
        }
        info!(id = d.id, title, reasoning = %d.reasoning, "INCLUDED");
        curated.push(CuratedArticle {
            article: candidates[index].clone(),
            candidate_index: index,
            rationale: Some(d.reasoning.clone()),
        });
    }
    curated
}

fn pass_through(candidates: Vec<CandidateArticle>) -> Vec<CuratedArticle> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(candidate_index, article)| CuratedArticle {
            article,
            candidate_index,
            rationale: None,
        })
        .collect()
}

/// Model-facing curation settings.
#[derive(Debug, Clone)]
pub struct Curator {
    /// System prompt; `{top_n}` is substituted per call.
    pub prompt_template: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub retry: RetryPolicy,
}

impl Curator {
    /// Ask `model` to pick the most newsworthy of `candidates`.
    ///
    /// `top_n` is a request to the model, not a cap: whatever it flags
    /// relevant is kept. `previous_titles` lets the model reject stories
    /// already published.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), top_n = top_n))]
    pub async fn curate<M: TextModel>(
        &self,
        model: &M,
        candidates: Vec<CandidateArticle>,
        top_n: usize,
        previous_titles: &[String],
    ) -> CurationResult {
        if candidates.is_empty() {
            info!("No candidates to curate");
            return CurationResult::Filtered(Vec::new());
        }

        let system = self.prompt_template.replace("{top_n}", &top_n.to_string());
        let request = TextRequest::new(system, build_prompt(&candidates, previous_titles))
            .with_model(self.model.clone())
            .with_schema(decision_schema())
            .with_max_output_tokens(self.max_output_tokens);

        match generate_json::<M, Vec<CurationDecision>>(model, &request, &self.retry, "curation").await {
            Ok(decisions) => {
                let curated = project_decisions(&decisions, &candidates);
                info!(
                    decisions = decisions.len(),
                    selected = curated.len(),
                    "Curation complete"
                );
                CurationResult::Filtered(curated)
            }
            Err(e) => {
                warn!(error = %e, count = candidates.len(), "Curation failed; returning all articles unfiltered");
                CurationResult::Unfiltered {
                    articles: pass_through(candidates),
                    reason: e.to_string(),
                }
            }
        }
    }
}
