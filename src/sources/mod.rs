//! Source fetching: RSS/Atom feeds and the keyword news-search API.
//!
//! Every source produces its own list of [`CandidateArticle`]s independently.
//! A source that fails to fetch or parse is logged and contributes nothing;
//! it never aborts the run.
//!
//! # Sources
//!
//! - [`rss`]: any number of configured RSS 2.0 or Atom feeds
//! - [`newsapi`]: one keyword query against the NewsAPI `everything` endpoint,
//!   skipped when no API key is configured

pub mod newsapi;
pub mod rss;

use crate::config::{FeedSource, NewsApiConfig};
use crate::models::CandidateArticle;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Error type for source I/O helpers.
pub type SourceError = Box<dyn Error + Send + Sync>;

/// Feeds fetched at once.
const FEED_CONCURRENCY: usize = 8;

/// Start of the trailing window of `days` days ending at `now`.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - ChronoDuration::days(i64::from(days))
}

/// Owns the HTTP client and source settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: Client,
    feeds: Vec<FeedSource>,
    newsapi: NewsApiConfig,
    newsapi_key: Option<String>,
}

impl SourceFetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(
        feeds: Vec<FeedSource>,
        newsapi: NewsApiConfig,
        newsapi_key: Option<String>,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(newsapi.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            http,
            feeds,
            newsapi,
            newsapi_key: newsapi_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Fetch every source and return the union of their in-window articles.
    ///
    /// Feeds come first in configuration order, then the search API, so that
    /// first-seen order is stable across runs.
    #[instrument(level = "info", skip_all, fields(days = days, feeds = self.feeds.len()))]
    pub async fn fetch_all(&self, days: u32, now: DateTime<Utc>) -> Vec<CandidateArticle> {
        let since = window_start(now, days);

        let per_feed: Vec<Vec<CandidateArticle>> = stream::iter(self.feeds.iter())
            .map(|feed| async move {
                match rss::fetch_feed(&self.http, feed, since).await {
                    Ok(articles) => articles,
                    Err(e) => {
                        error!(source = %feed.name, url = %feed.url, error = %e, "Feed fetch failed; contributing 0 articles");
                        Vec::new()
                    }
                }
            })
            .buffered(FEED_CONCURRENCY)
            .collect()
            .await;

        let mut all: Vec<CandidateArticle> = per_feed.into_iter().flatten().collect();

        match self.newsapi_key.as_deref() {
            Some(key) => match newsapi::fetch(&self.http, &self.newsapi, key, since).await {
                Ok(mut articles) => all.append(&mut articles),
                Err(e) => error!(error = %e, "NewsAPI fetch failed; contributing 0 articles"),
            },
            None => info!("NewsAPI key not configured; skipping NewsAPI"),
        }

        info!(count = all.len(), "Fetched candidate articles from all sources");
        all
    }
}
