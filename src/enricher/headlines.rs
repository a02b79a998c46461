//! Newspaper-style headline, subheading and body per article.
//!
//! One structured LLM call per article. A failed call yields a placeholder
//! record built from the original title, so the output always has one entry
//! per input.

use crate::llm::{TextModel, TextRequest, generate_json};
use crate::models::{HeadlineFields, ScrapedArticle};
use crate::retry::RetryPolicy;
use crate::utils::truncate_chars;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{error, info, instrument};

/// Placeholder for subheading and body when generation fails.
pub const UNAVAILABLE: &str = "Unavailable due to an error.";

const PARALLEL_BATCH_SIZE: usize = 12;

/// Structured-output schema for [`HeadlineFields`].
pub fn headline_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "headline": {"type": "STRING", "description": "The main headline in newspaper style."},
            "subheading": {"type": "STRING", "description": "A one-line subheading giving context."},
            "content": {"type": "STRING", "description": "The rewritten article body."},
            "rex_take": {"type": "STRING", "description": "One witty sentence of editorial commentary.", "nullable": true}
        },
        "required": ["headline", "subheading", "content"],
        "propertyOrdering": ["headline", "subheading", "content", "rex_take"]
    })
}

/// Model input for one article. Content is cut to `max_content_chars`.
pub fn build_input(article: &ScrapedArticle, max_content_chars: usize) -> String {
    let a = article.article();
    format!(
        "Article:\nTitle: {}\nDescription: {}\nContent: {}\nSource: {}\n",
        a.title,
        a.description,
        truncate_chars(&article.content, max_content_chars),
        a.source
    )
}

/// Record used when generation fails.
pub fn fallback_fields(article: &ScrapedArticle) -> HeadlineFields {
    HeadlineFields {
        headline: article.article().title.clone(),
        subheading: UNAVAILABLE.to_string(),
        content: UNAVAILABLE.to_string(),
        rex_take: None,
    }
}

/// Headline-generation settings.
#[derive(Debug, Clone)]
pub struct HeadlineWriter {
    pub prompt: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub max_content_chars: usize,
    pub retry: RetryPolicy,
}

impl HeadlineWriter {
    /// Generate fields for every article, in input order.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn write_all<M: TextModel>(
        &self,
        model: &M,
        articles: &[ScrapedArticle],
    ) -> Vec<HeadlineFields> {
        let fields: Vec<HeadlineFields> = stream::iter(articles.iter().enumerate())
            .map(|(index, article)| self.write_one(model, article, index))
            .buffered(PARALLEL_BATCH_SIZE)
            .collect()
            .await;

        let failed = fields.iter().filter(|f| f.subheading == UNAVAILABLE).count();
        info!(total = fields.len(), failed, "Headline generation complete");
        fields
    }

    #[instrument(level = "info", skip_all, fields(index = index, link = %article.article().link))]
    async fn write_one<M: TextModel>(
        &self,
        model: &M,
        article: &ScrapedArticle,
        index: usize,
    ) -> HeadlineFields {
        let request = TextRequest::new(
            self.prompt.clone(),
            build_input(article, self.max_content_chars),
        )
        .with_model(self.model.clone())
        .with_schema(headline_schema())
        .with_max_output_tokens(self.max_output_tokens);

        match generate_json::<M, HeadlineFields>(model, &request, &self.retry, "headline").await {
            Ok(mut fields) => {
                fields.rex_take = fields.rex_take.filter(|t| !t.trim().is_empty());
                info!(headline = %fields.headline, subheading = %fields.subheading, "Generated headline");
                fields
            }
            Err(e) => {
                error!(title = %truncate_chars(&article.article().title, 50), error = %e, "Headline generation failed; using fallback");
                fallback_fields(article)
            }
        }
    }
}
