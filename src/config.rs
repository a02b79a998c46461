//! Pipeline configuration.
//!
//! Settings come from an optional YAML file; every section falls back to
//! built-in defaults, so a file only needs the keys it changes. Credentials
//! are never read from the file, only from the command line or environment
//! (see [`crate::cli`]).
//!
//! ```yaml
//! feeds:
//!   - name: OpenAI
//!     url: https://openai.com/news/rss.xml
//! scraper:
//!   concurrency: 8
//! images:
//!   batch_size: 4
//!   batch_delay_secs: 90
//! ```

use crate::retry::{RetryOverrides, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// One RSS or Atom feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Label stored as the article's `source`.
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

fn default_feeds() -> Vec<FeedSource> {
    vec![
        FeedSource::new("OpenAI", "https://openai.com/news/rss.xml"),
        FeedSource::new("DeepMind", "https://deepmind.com/blog/feed/basic"),
        FeedSource::new(
            "Anthropic",
            "https://raw.githubusercontent.com/Olshansk/rss-feeds/main/feeds/feed_anthropic.xml",
        ),
        FeedSource::new(
            "Ollama",
            "https://raw.githubusercontent.com/Olshansk/rss-feeds/main/feeds/feed_ollama.xml",
        ),
        FeedSource::new("Microsoft", "https://www.microsoft.com/en-us/research/feed/"),
        FeedSource::new("Hugging Face", "https://huggingface.co/blog/feed.xml"),
        FeedSource::new("KnowTechie AI", "https://knowtechie.com/category/ai/feed/"),
    ]
}

/// Keyword news-search API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsApiConfig {
    pub endpoint: String,
    pub page_size: u32,
    pub language: String,
    /// Relevance terms, OR-ed together.
    pub include_terms: Vec<String>,
    /// Announcement verbs, OR-ed together and AND-ed with `include_terms`.
    pub action_terms: Vec<String>,
    /// Opinion / how-to / listicle patterns excluded with `AND NOT`.
    pub exclude_terms: Vec<String>,
    pub timeout_secs: u64,
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://newsapi.org/v2/everything".to_string(),
            page_size: 20,
            language: "en".to_string(),
            include_terms: terms(&[
                "artificial intelligence",
                "AI",
                "machine learning",
                "LLM",
                "large language model",
                "generative AI",
                "GenAI",
                "ML",
                "Qwen",
                "Deepseek",
                "Mistral",
                "LLAMA",
            ]),
            action_terms: terms(&[
                "launch",
                "release",
                "breakthrough",
                "new",
                "announce",
                "update",
                "develop",
                "open source",
                "product",
                "revolutionize",
                "introducing",
                "launches",
                "unveils",
            ]),
            exclude_terms: terms(&[
                "opinion",
                "speculate",
                "think piece",
                "future of",
                "how to",
                "guide",
                "tutorial",
                "webinar",
                "top 10",
                "rumor",
                "how-to",
            ]),
            timeout_secs: 30,
        }
    }
}

/// Gemini model selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub curation_model: String,
    pub headline_model: String,
    pub image_prompt_model: String,
    pub image_model: String,
    pub aspect_ratio: String,
    pub curation_max_tokens: u32,
    pub headline_max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            curation_model: "gemini-2.0-flash".to_string(),
            headline_model: "gemini-2.0-flash".to_string(),
            image_prompt_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.0-flash-preview-image-generation".to_string(),
            aspect_ratio: "16:9".to_string(),
            curation_max_tokens: 8192,
            headline_max_tokens: 2048,
            request_timeout_secs: 120,
        }
    }
}

/// Content scraper settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Pages fetched at once.
    pub concurrency: usize,
    /// Minimum extracted characters for a tier to be accepted.
    pub min_chars: usize,
    /// Per-page request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Selectors for prose containers inside `<article>`.
    pub body_selectors: Vec<String>,
    /// Characters of scraped content sent to the headline model.
    pub max_prompt_chars: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrency: 15,
            min_chars: 200,
            timeout_secs: 30,
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
                "AppleWebKit/537.36 (KHTML, like Gecko) ",
                "Chrome/127.0.0.0 Safari/537.36"
            )
            .to_string(),
            body_selectors: terms(&["div.prose", "[itemprop='articleBody']"]),
            max_prompt_chars: 10_000,
        }
    }
}

/// Featured image generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub enabled: bool,
    /// Articles per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 6,
            batch_delay_secs: 60,
        }
    }
}

/// Retry policies per class of call site.
///
/// Each section in a file is laid over its own preset
/// ([`RetryPolicy::llm`], [`RetryPolicy::upload`]), so setting one field
/// keeps the preset's other values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRetryConfig")]
pub struct RetryConfig {
    pub llm: RetryPolicy,
    pub upload: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRetryConfig {
    llm: RetryOverrides,
    upload: RetryOverrides,
}

impl From<RawRetryConfig> for RetryConfig {
    fn from(raw: RawRetryConfig) -> Self {
        Self {
            llm: raw.llm.over(RetryPolicy::llm()),
            upload: raw.upload.over(RetryPolicy::upload()),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            llm: RetryPolicy::llm(),
            upload: RetryPolicy::upload(),
        }
    }
}

/// System instructions for each LLM call. Treated as opaque text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Curation instructions. `{top_n}` is replaced with the target count.
    pub curation: String,
    pub headline: String,
    pub image_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            curation: "You are the news editor of a daily AI newsletter. From the numbered news \
                items, pick the {top_n} most significant pieces of genuine AI news: model \
                releases, research breakthroughs, product launches and major industry moves. \
                Exclude opinion pieces, tutorials, listicles, rumors and items that repeat a \
                story already covered by another item or by the previously published list. \
                Return one decision per item you consider, most important first, with the \
                item's id, its title, a one-sentence reasoning and is_relevant_news."
                .to_string(),
            headline: "You are a newspaper sub-editor covering AI. Given an article, write a \
                punchy newspaper headline, a one-line subheading that gives context, and a \
                complete, factual summary of the article in a few short paragraphs. Optionally \
                add rex_take: one witty sentence of editorial commentary."
                .to_string(),
            image_prompt: "Write a single prompt for an image generation model describing an \
                editorial illustration for this news story. Describe subject, composition, \
                style and lighting. No text, logos or real people's faces. Reply with the \
                prompt only."
                .to_string(),
        }
    }
}

/// All pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedSource>,
    pub newsapi: NewsApiConfig,
    pub gemini: GeminiConfig,
    pub scraper: ScraperConfig,
    pub images: ImageConfig,
    pub retry: RetryConfig,
    pub prompts: PromptConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            newsapi: NewsApiConfig::default(),
            gemini: GeminiConfig::default(),
            scraper: ScraperConfig::default(),
            images: ImageConfig::default(),
            retry: RetryConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str, path: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Self::default());
        };
        let shown = path.display().to_string();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: shown.clone(),
            source,
        })?;
        let config = Self::from_yaml(&yaml, &shown)?;
        info!(path = %shown, feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Reject settings that would stall or break a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.concurrency == 0 {
            return Err(ConfigError::Invalid("scraper.concurrency must be > 0".into()));
        }
        if self.images.batch_size == 0 {
            return Err(ConfigError::Invalid("images.batch_size must be > 0".into()));
        }
        if let Some(feed) = self.feeds.iter().find(|f| url::Url::parse(&f.url).is_err()) {
            return Err(ConfigError::Invalid(format!(
                "feed '{}' has an invalid url '{}'",
                feed.name, feed.url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.feeds.len(), 7);
        assert_eq!(config.scraper.min_chars, 200);
        assert_eq!(config.images.batch_size, 6);
        assert_eq!(config.images.batch_delay_secs, 60);
        assert!(config.prompts.curation.contains("{top_n}"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
scraper:
  concurrency: 4
images:
  batch_size: 3
"#;
        let config = PipelineConfig::from_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(config.scraper.concurrency, 4);
        assert_eq!(config.scraper.min_chars, 200);
        assert_eq!(config.images.batch_size, 3);
        assert_eq!(config.images.batch_delay_secs, 60);
        assert_eq!(config.feeds.len(), 7);
        assert_eq!(config.retry.llm, RetryPolicy::llm());
    }

    #[test]
    fn test_yaml_feeds_replace_defaults() {
        let yaml = r#"
feeds:
  - name: Example
    url: https://example.com/feed.xml
retry:
  upload:
    max_retries: 1
"#;
        let config = PipelineConfig::from_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(config.feeds, vec![FeedSource::new("Example", "https://example.com/feed.xml")]);
        assert_eq!(config.retry.upload.max_retries, 1);
        assert_eq!(config.retry.upload.max_delay_ms, RetryPolicy::upload().max_delay_ms);
        assert_eq!(config.retry.llm, RetryPolicy::llm());
    }

    #[test]
    fn test_partial_retry_section_keeps_preset() {
        let yaml = "retry:\n  llm:\n    max_retries: 2\n";
        let config = PipelineConfig::from_yaml(yaml, "test.yaml").unwrap();
        assert_eq!(config.retry.llm.max_retries, 2);
        assert_eq!(config.retry.llm.base_delay_ms, RetryPolicy::llm().base_delay_ms);
        assert_eq!(config.retry.llm.max_delay_ms, RetryPolicy::llm().max_delay_ms);
        assert_eq!(config.retry.upload, RetryPolicy::upload());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ai_news_desk_config_{}.yaml", std::process::id()));
        std::fs::write(&path, "images:\n  batch_size: 2\n").unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.images.batch_size, 2);
        assert_eq!(config.feeds.len(), 7);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let yaml = "images:\n  batch_size: 0\n";
        assert!(matches!(
            PipelineConfig::from_yaml(yaml, "test.yaml"),
            Err(ConfigError::Invalid(_))
        ));
        let yaml = "feeds:\n  - name: Bad\n    url: not a url\n";
        assert!(matches!(
            PipelineConfig::from_yaml(yaml, "test.yaml"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::from_yaml("scraper: [1, 2]", "test.yaml"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = PipelineConfig::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
