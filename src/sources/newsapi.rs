//! NewsAPI keyword search.
//!
//! One query per run against the `everything` endpoint, built from three
//! term lists in [`NewsApiConfig`]:
//!
//! ```text
//! (include OR ...) AND (action OR ...) AND NOT (exclude OR ...)
//! ```
//!
//! Multi-word terms are quoted. The search window starts at the same instant
//! as the feed window.

use super::SourceError;
use crate::config::NewsApiConfig;
use crate::models::CandidateArticle;
use crate::sources::rss::parse_feed_date;
use crate::utils::{strip_html, truncate_for_log};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<SearchArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArticle {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    source: Option<SearchSource>,
}

#[derive(Debug, Deserialize)]
struct SearchSource {
    name: Option<String>,
}

fn quote(term: &str) -> String {
    if term.contains(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term.to_string()
    }
}

fn disjunction(terms: &[String]) -> String {
    let joined = terms.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" OR ");
    format!("({})", joined)
}

/// Build the search query from the configured term lists. Empty lists are
/// left out.
pub fn build_query(config: &NewsApiConfig) -> String {
    let mut query = String::new();
    for terms in [&config.include_terms, &config.action_terms] {
        if terms.is_empty() {
            continue;
        }
        if !query.is_empty() {
            query.push_str(" AND ");
        }
        query.push_str(&disjunction(terms));
    }
    if !config.exclude_terms.is_empty() {
        if !query.is_empty() {
            query.push(' ');
        }
        query.push_str("AND NOT ");
        query.push_str(&disjunction(&config.exclude_terms));
    }
    query
}

impl SearchArticle {
    fn into_candidate(self) -> CandidateArticle {
        let description = strip_html(self.description.as_deref().unwrap_or_default());
        let publisher = self
            .source
            .and_then(|s| s.name)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "NewsAPI".to_string());
        CandidateArticle {
            title: self.title.unwrap_or_default().trim().to_string(),
            link: self.url.unwrap_or_default().trim().to_string(),
            summary: description.clone(),
            description,
            published_date: self.published_at.as_deref().and_then(parse_feed_date),
            source: format!("{} via NewsAPI", publisher),
        }
    }
}

/// Run the keyword query for articles published since `since`.
#[instrument(level = "info", skip_all, fields(endpoint = %config.endpoint))]
pub async fn fetch(
    http: &Client,
    config: &NewsApiConfig,
    api_key: &str,
    since: DateTime<Utc>,
) -> Result<Vec<CandidateArticle>, SourceError> {
    let query = build_query(config);
    let from = since.format("%Y-%m-%dT%H:%M:%S").to_string();
    let page_size = config.page_size.to_string();
    debug!(%query, %from, "NewsAPI query");

    let res = http
        .get(&config.endpoint)
        .header("X-Api-Key", api_key)
        .query(&[
            ("q", query.as_str()),
            ("from", from.as_str()),
            ("language", config.language.as_str()),
            ("sortBy", "relevancy"),
            ("searchIn", "title,description"),
            ("pageSize", page_size.as_str()),
        ])
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(format!("NewsAPI returned {}: {}", status, truncate_for_log(&body, 300)).into());
    }

    let body: SearchResponse = res.json().await?;
    if body.status.as_deref() == Some("error") {
        return Err(format!(
            "NewsAPI error: {}",
            body.message.unwrap_or_else(|| "unknown".to_string())
        )
        .into());
    }

    let articles: Vec<CandidateArticle> = body
        .articles
        .into_iter()
        .map(SearchArticle::into_candidate)
        .collect();
    info!(count = articles.len(), "Found relevant articles from NewsAPI");
    Ok(articles)
}
