//! Full-text scraping of curated articles.
//!
//! Every article goes through the same ordered chain:
//!
//! 1. fetch the page HTML with a browser-like client
//! 2. run each [`Extractor`] in order, accepting the first result with at
//!    least `min_chars` characters
//! 3. otherwise use the article's stored description
//!
//! Pages are fetched concurrently, bounded by `concurrency`. Output order
//! always matches input order and no article is ever dropped.

pub mod extractors;

use crate::config::ScraperConfig;
use crate::models::{CandidateArticle, CuratedArticle, ExtractionMethod, ScrapedArticle};
use extractors::{ArticleDomExtractor, Extractor, ReadabilityExtractor};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Error type for page fetches.
pub type FetchError = Box<dyn Error + Send + Sync>;

/// Source of raw page HTML.
pub trait PageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageFetcher`] over HTTP with browser-like headers.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(format!("page returned {}", status).into());
        }
        Ok(res.text().await?)
    }
}

/// The default extractor chain: readability, then `<article>` DOM.
pub fn default_extractors(config: &ScraperConfig) -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(ReadabilityExtractor),
        Box::new(ArticleDomExtractor::new(&config.body_selectors)),
    ]
}

/// Content used when no extractor succeeds: the description, or the title
/// or link when the description is blank.
pub fn fallback_content(article: &CandidateArticle) -> String {
    [&article.description, &article.title, &article.link]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "(no content)".to_string())
}

/// Scrapes curated articles with a fetcher and an extractor chain.
pub struct ContentScraper<F> {
    fetcher: F,
    extractors: Vec<Box<dyn Extractor>>,
    concurrency: usize,
    min_chars: usize,
}

impl<F: PageFetcher> ContentScraper<F> {
    pub fn new(fetcher: F, extractors: Vec<Box<dyn Extractor>>, config: &ScraperConfig) -> Self {
        Self {
            fetcher,
            extractors,
            concurrency: config.concurrency.max(1),
            min_chars: config.min_chars,
        }
    }

    /// Scrape every article. The output has the same length and order as
    /// `articles`, and every `content` is non-empty.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn scrape_all(&self, articles: Vec<CuratedArticle>) -> Vec<ScrapedArticle> {
        let total = articles.len();
        let t0 = Instant::now();

        let mut results: Vec<(usize, ScrapedArticle)> = stream::iter(articles.into_iter().enumerate())
            .map(|(index, curated)| async move {
                let scraped = self.scrape_one(curated, index + 1, total).await;
                (index, scraped)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);
        let scraped: Vec<ScrapedArticle> = results.into_iter().map(|(_, s)| s).collect();

        let count = |m: ExtractionMethod| scraped.iter().filter(|s| s.extraction_method == m).count();
        info!(
            total,
            primary = count(ExtractionMethod::Primary),
            secondary = count(ExtractionMethod::Secondary),
            fallback = count(ExtractionMethod::FallbackDescription),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Scraping complete"
        );
        scraped
    }

    #[instrument(level = "info", skip_all, fields(index = position, link = %curated.article.link))]
    async fn scrape_one(&self, curated: CuratedArticle, position: usize, total: usize) -> ScrapedArticle {
        if let Some((content, method)) = self.extract(&curated.article.link).await {
            info!(position, total, %method, chars = content.chars().count(), "Scraped article");
            return ScrapedArticle {
                curated,
                content,
                extraction_method: method,
            };
        }

        let content = fallback_content(&curated.article);
        info!(position, total, "Using description as content");
        ScrapedArticle {
            curated,
            content,
            extraction_method: ExtractionMethod::FallbackDescription,
        }
    }

    /// Fetch `link` and run the extractor chain. `None` means fall back.
    async fn extract(&self, link: &str) -> Option<(String, ExtractionMethod)> {
        let page_url = match Url::parse(link) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "Unparseable article link");
                return None;
            }
        };
        let html = match self.fetcher.fetch_html(link).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Failed to download article");
                return None;
            }
        };

        for extractor in &self.extractors {
            match extractor.try_extract(&html, &page_url) {
                Some(text) => {
                    let text = text.trim();
                    let chars = text.chars().count();
                    if chars >= self.min_chars {
                        return Some((text.to_string(), extractor.method()));
                    }
                    debug!(extractor = extractor.name(), chars, min = self.min_chars, "Extracted text too short");
                }
                None => debug!(extractor = extractor.name(), "Extractor found nothing"),
            }
        }
        None
    }
}
