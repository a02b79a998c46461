//! Stage orchestration for one pipeline run.
//!
//! ```text
//! fetch -> dedupe -> timeframe -> curate -> scrape -> enrich
//! ```
//!
//! Each stage receives the complete output of the previous one. Fan-out
//! happens only inside stages (feeds, pages, model calls). No stage returns
//! an error: failures are absorbed where they happen and the run always ends
//! with a [`RunReport`], possibly with zero articles.

use crate::config::PipelineConfig;
use crate::curator::Curator;
use crate::enricher::Enricher;
use crate::enricher::headlines::HeadlineWriter;
use crate::enricher::images::ImageGenerator;
use crate::filter::{dedupe, filter_timeframe};
use crate::llm::{ImageModel, TextModel};
use crate::models::{CandidateArticle, ExtractionMethod, RunReport, StageCounts};
use crate::scraper::{ContentScraper, PageFetcher, default_extractors};
use crate::sources::SourceFetcher;
use chrono::{DateTime, Local, Utc};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Every stage of the news pipeline, wired to its models and fetchers.
pub struct NewsPipeline<T, I, F> {
    sources: SourceFetcher,
    curator: Curator,
    scraper: ContentScraper<F>,
    enricher: Enricher,
    text: T,
    image: I,
}

impl<T: TextModel, I: ImageModel, F: PageFetcher> NewsPipeline<T, I, F> {
    /// Wire the stages from `config`.
    pub fn new(config: &PipelineConfig, sources: SourceFetcher, fetcher: F, text: T, image: I) -> Self {
        let gemini = &config.gemini;
        let curator = Curator {
            prompt_template: config.prompts.curation.clone(),
            model: gemini.curation_model.clone(),
            max_output_tokens: gemini.curation_max_tokens,
            retry: config.retry.llm.clone(),
        };
        let scraper = ContentScraper::new(fetcher, default_extractors(&config.scraper), &config.scraper);
        let enricher = Enricher {
            headlines: HeadlineWriter {
                prompt: config.prompts.headline.clone(),
                model: gemini.headline_model.clone(),
                max_output_tokens: gemini.headline_max_tokens,
                max_content_chars: config.scraper.max_prompt_chars,
                retry: config.retry.llm.clone(),
            },
            images: config.images.enabled.then(|| ImageGenerator {
                prompt: config.prompts.image_prompt.clone(),
                prompt_model: gemini.image_prompt_model.clone(),
                aspect_ratio: gemini.aspect_ratio.clone(),
                batch_size: config.images.batch_size,
                batch_delay: Duration::from_secs(config.images.batch_delay_secs),
                retry: config.retry.llm.clone(),
            }),
        };
        Self {
            sources,
            curator,
            scraper,
            enricher,
            text,
            image,
        }
    }

    /// Fetch from every source, then run the remaining stages.
    ///
    /// `previous_titles` are recently published post titles the curator
    /// should avoid repeating.
    #[instrument(level = "info", skip_all, fields(days = days, top_n = top_n))]
    pub async fn run(&self, days: u32, top_n: usize, previous_titles: &[String]) -> RunReport {
        let now = Utc::now();
        let fetched = self.sources.fetch_all(days, now).await;
        self.process(fetched, now, days, top_n, previous_titles).await
    }

    /// Run every stage after fetching on an already-fetched collection.
    #[instrument(level = "info", skip_all, fields(fetched = fetched.len()))]
    pub async fn process(
        &self,
        fetched: Vec<CandidateArticle>,
        now: DateTime<Utc>,
        days: u32,
        top_n: usize,
        previous_titles: &[String],
    ) -> RunReport {
        let t0 = Instant::now();
        let mut counts = StageCounts {
            fetched: fetched.len(),
            ..StageCounts::default()
        };

        let unique = dedupe(fetched);
        counts.unique = unique.len();

        let in_window = filter_timeframe(unique, now, days);
        counts.in_window = in_window.len();

        let curation = self
            .curator
            .curate(&self.text, in_window, top_n, previous_titles)
            .await;
        let curation_fallback_reason = curation.fallback_reason().map(str::to_string);
        let curated = curation.into_articles();
        counts.curated = curated.len();

        let scraped = self.scraper.scrape_all(curated).await;
        for s in &scraped {
            match s.extraction_method {
                ExtractionMethod::Primary => counts.scraped_primary += 1,
                ExtractionMethod::Secondary => counts.scraped_secondary += 1,
                ExtractionMethod::FallbackDescription => counts.scraped_fallback += 1,
            }
        }

        let articles = self.enricher.enrich(&self.text, &self.image, scraped).await;
        counts.images = articles.iter().filter(|a| a.featured_image.is_some()).count();

        let local = Local::now();
        info!(
            ?counts,
            curation_fallback = curation_fallback_reason.is_some(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        RunReport {
            local_date: local.date_naive().to_string(),
            local_time: local.format("%H:%M:%S").to_string(),
            days_ago: days,
            top_n,
            counts,
            curation_fallback_reason,
            articles,
        }
    }
}
