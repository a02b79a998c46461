//! Command-line interface for AI News Desk.
//!
//! Credentials are only accepted as flags or environment variables, never
//! from the YAML config file.

use crate::config::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one pipeline run.
///
/// # Examples
///
/// ```sh
/// # Fetch the last week, curate up to 12 stories, publish them
/// GEMINI_API_KEY=... BLOG_API_BASE_URL=http://localhost:8000/api ai_news_desk
///
/// # Three days, report to disk, publish nothing
/// ai_news_desk --days 3 -j ./json --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Number of trailing days of news to consider
    #[arg(short, long, default_value_t = 7)]
    pub days: u32,

    /// Number of stories the curator should aim for
    #[arg(short = 'n', long, default_value_t = 12)]
    pub top_n: usize,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the JSON run report
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Run every stage but publish nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// NewsAPI key; the search source is skipped without it
    #[arg(long, env = "NEWSAPI_KEY", hide_env_values = true)]
    pub newsapi_key: Option<String>,

    /// Blog API base URL; publishing is skipped without it
    #[arg(long, env = "BLOG_API_BASE_URL")]
    pub blog_api_base_url: Option<String>,

    /// Supabase project URL for image storage
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key for image storage
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Storage bucket for featured images
    #[arg(long, env = "SUPABASE_BUCKET", default_value = "images")]
    pub supabase_bucket: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Cli {
    /// The Gemini key, or an error naming the missing variable.
    pub fn require_gemini_key(&self) -> Result<&str, ConfigError> {
        non_empty(&self.gemini_api_key).ok_or(ConfigError::MissingCredential("GEMINI_API_KEY"))
    }

    pub fn blog_api_base_url(&self) -> Option<&str> {
        non_empty(&self.blog_api_base_url)
    }

    /// Supabase URL and key, when both are set.
    pub fn supabase(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.supabase_url)?, non_empty(&self.supabase_key)?))
    }
}
