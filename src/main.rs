//! # AI News Desk
//!
//! One invocation is one pipeline run: fetch, filter, curate, scrape, enrich,
//! then write the run report and publish. Intended to be started by a
//! scheduler.
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... ai_news_desk --days 7 --top-n 12 -j ./json
//! ```

use ai_news_desk::cli::Cli;
use ai_news_desk::config::PipelineConfig;
use ai_news_desk::llm::gemini::GeminiClient;
use ai_news_desk::outputs::json;
use ai_news_desk::pipeline::NewsPipeline;
use ai_news_desk::publish::{BlogApiPostStore, Publisher, SupabaseImageStore};
use ai_news_desk::scraper::HttpPageFetcher;
use ai_news_desk::sources::SourceFetcher;
use ai_news_desk::utils::ensure_writable_dir;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

/// Recent post titles handed to the curator.
const RECENT_TITLES_LIMIT: usize = 20;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ai_news_desk starting up");

    let args = Cli::parse();
    debug!(days = args.days, top_n = args.top_n, dry_run = args.dry_run, "Parsed CLI arguments");

    let gemini_key = match args.require_gemini_key() {
        Ok(key) => key.to_string(),
        Err(e) => {
            error!(error = %e, "Cannot start without a Gemini API key");
            return Err(e.into());
        }
    };

    let config = PipelineConfig::load(args.config.as_deref())?;

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = args.json_output_dir.as_deref() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Clients ----
    let text = GeminiClient::new(gemini_key.as_str(), &config.gemini)?;
    let image = text.clone();
    let sources = SourceFetcher::new(
        config.feeds.clone(),
        config.newsapi.clone(),
        args.newsapi_key.clone(),
        &config.scraper.user_agent,
    )?;
    let fetcher = HttpPageFetcher::new(&config.scraper)?;

    let publisher = match args.blog_api_base_url() {
        Some(base_url) => {
            let images = match args.supabase() {
                Some((url, key)) => Some(SupabaseImageStore::new(url, key, &args.supabase_bucket)?),
                None => {
                    warn!("Supabase not configured; posts will be published without images");
                    None
                }
            };
            let posts = BlogApiPostStore::new(base_url)?;
            Some(Publisher::new(images, posts, config.retry.upload.clone()))
        }
        None => {
            info!("BLOG_API_BASE_URL not set; publishing disabled");
            None
        }
    };

    let previous_titles = match publisher.as_ref() {
        Some(p) => p.recent_titles(RECENT_TITLES_LIMIT).await,
        None => Vec::new(),
    };

    // ---- Run ----
    let pipeline = NewsPipeline::new(&config, sources, fetcher, text, image);
    let report = pipeline.run(args.days, args.top_n, &previous_titles).await;

    if let Some(reason) = report.curation_fallback_reason.as_deref() {
        warn!(%reason, "Curation fell back to the unfiltered set");
    }

    if let Some(dir) = args.json_output_dir.as_deref() {
        if let Err(e) = json::write_report(&report, dir).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    // ---- Publish ----
    match publisher {
        Some(_) if args.dry_run => {
            info!(count = report.articles.len(), "Dry run; not publishing")
        }
        Some(p) => {
            let summary = p.publish_all(&report.articles).await;
            info!(?summary, "Publish pass finished");
        }
        None => {}
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        articles = report.articles.len(),
        "Execution complete"
    );

    Ok(())
}
