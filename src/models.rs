//! Data models for articles as they move through the news pipeline.
//!
//! Each stage wraps the record produced by the previous one instead of
//! mutating it, so a later record always carries its full provenance:
//!
//! - [`CandidateArticle`]: raw item from a feed or the search API
//! - [`CuratedArticle`]: a candidate the curator kept, with its index and rationale
//! - [`ScrapedArticle`]: a curated article plus extracted full text
//! - [`EnrichedArticle`]: a scraped article plus headline, body and image
//! - [`RunReport`]: everything one pipeline invocation produced

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Titles the search API uses for retracted articles.
pub const REMOVED_TITLE: &str = "[Removed]";

/// Link sentinels that never identify a real article.
pub const INVALID_LINKS: &[&str] = &["N/A", "https://removed.com"];

/// A raw news item before curation.
///
/// `link` is the unique key across all sources. `description` is plain text
/// (HTML already stripped) and is the last-resort article body when scraping
/// fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateArticle {
    /// Headline as published by the source.
    pub title: String,
    /// Canonical URL of the article.
    pub link: String,
    /// Short plain-text description.
    pub description: String,
    /// Publish time normalized to UTC, when the source provided one.
    pub published_date: Option<DateTime<Utc>>,
    /// Source-provided summary; often identical to `description`.
    pub summary: String,
    /// Label of the feed or API the item came from.
    pub source: String,
}

impl CandidateArticle {
    /// Whether this item can be carried through the pipeline.
    ///
    /// A valid item has a non-empty title that is not the retraction marker,
    /// and a non-empty link that is not one of the known sentinels.
    pub fn is_valid(&self) -> bool {
        let link = self.link.trim();
        let title = self.title.trim();
        !link.is_empty()
            && !INVALID_LINKS.contains(&link)
            && !title.is_empty()
            && title != REMOVED_TITLE
    }

    /// Host of the article link, e.g. `"openai.com"`.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    }
}

/// A candidate the curator kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedArticle {
    pub article: CandidateArticle,
    /// Zero-based position of the article in the curator's input.
    pub candidate_index: usize,
    /// Why the model included it. `None` when curation fell back to the
    /// unfiltered set.
    pub rationale: Option<String>,
}

/// Which tier of the scraper produced an article's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// Boilerplate-stripping readability extraction.
    Primary,
    /// DOM-targeted `<article>` extraction.
    Secondary,
    /// The stored description, used verbatim.
    FallbackDescription,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Primary => "primary",
            ExtractionMethod::Secondary => "secondary",
            ExtractionMethod::FallbackDescription => "fallback-description",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A curated article with full text attached. `content` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub curated: CuratedArticle,
    pub content: String,
    pub extraction_method: ExtractionMethod,
}

impl ScrapedArticle {
    pub fn article(&self) -> &CandidateArticle {
        &self.curated.article
    }
}

/// Editorial fields produced by the headline model.
///
/// Field names match the JSON schema the model is asked to follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineFields {
    /// Main headline in newspaper style.
    pub headline: String,
    /// One-line context under the headline.
    pub subheading: String,
    /// Rewritten article body.
    pub content: String,
    /// Optional one-sentence editorial aside.
    #[serde(default)]
    pub rex_take: Option<String>,
}

/// Featured image attached to an enriched article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeaturedImage {
    /// Image bytes as returned by the image model, base64-encoded.
    Inline { mime_type: String, data_base64: String },
    /// Image already uploaded to storage.
    Uploaded { url: String },
}

/// The terminal artifact handed to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    pub scraped: ScrapedArticle,
    pub headline: String,
    pub subheading: String,
    /// Body text written by the headline model (the lede and what follows).
    pub body: String,
    pub rex_take: Option<String>,
    pub featured_image: Option<FeaturedImage>,
}

impl EnrichedArticle {
    pub fn article(&self) -> &CandidateArticle {
        self.scraped.article()
    }

    pub fn link(&self) -> &str {
        &self.scraped.article().link
    }
}

/// Item counts after each stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    pub fetched: usize,
    pub unique: usize,
    pub in_window: usize,
    pub curated: usize,
    pub scraped_primary: usize,
    pub scraped_secondary: usize,
    pub scraped_fallback: usize,
    pub images: usize,
}

/// Everything one pipeline invocation produced, serialized for the JSON report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The date of the run in `YYYY-MM-DD` format.
    pub local_date: String,
    /// The local time of the run in `HH:MM:SS` format.
    pub local_time: String,
    pub days_ago: u32,
    pub top_n: usize,
    pub counts: StageCounts,
    /// Set when curation failed and the unfiltered set was used.
    pub curation_fallback_reason: Option<String>,
    pub articles: Vec<EnrichedArticle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, link: &str) -> CandidateArticle {
        CandidateArticle {
            title: title.to_string(),
            link: link.to_string(),
            description: "desc".to_string(),
            published_date: None,
            summary: "desc".to_string(),
            source: "Test".to_string(),
        }
    }

    #[test]
    fn test_valid_article() {
        assert!(candidate("A title", "https://example.com/a").is_valid());
    }

    #[test]
    fn test_invalid_links() {
        assert!(!candidate("A title", "").is_valid());
        assert!(!candidate("A title", "   ").is_valid());
        assert!(!candidate("A title", "N/A").is_valid());
        assert!(!candidate("A title", "https://removed.com").is_valid());
    }

    #[test]
    fn test_removed_title_is_invalid() {
        assert!(!candidate("[Removed]", "https://example.com/a").is_valid());
        assert!(!candidate("", "https://example.com/a").is_valid());
    }

    #[test]
    fn test_domain_strips_www() {
        let a = candidate("t", "https://www.deepmind.com/blog/x");
        assert_eq!(a.domain(), Some("deepmind.com".to_string()));
        assert_eq!(candidate("t", "not a url").domain(), None);
    }

    #[test]
    fn test_extraction_method_serializes_kebab_case() {
        let json = serde_json::to_string(&ExtractionMethod::FallbackDescription).unwrap();
        assert_eq!(json, "\"fallback-description\"");
        assert_eq!(ExtractionMethod::Primary.to_string(), "primary");
    }

    #[test]
    fn test_headline_fields_without_rex_take() {
        let json = r#"{"headline":"H","subheading":"S","content":"C"}"#;
        let fields: HeadlineFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.headline, "H");
        assert_eq!(fields.rex_take, None);
    }

    #[test]
    fn test_featured_image_tagging() {
        let image = FeaturedImage::Uploaded {
            url: "https://cdn.example.com/a.png".to_string(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["kind"], "uploaded");
        assert_eq!(json["url"], "https://cdn.example.com/a.png");
    }
}
