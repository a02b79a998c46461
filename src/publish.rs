//! Publishing enriched articles as blog posts.
//!
//! Two external stores sit behind traits:
//!
//! - [`ImageStore`]: takes image bytes and a path, returns a public URL
//!   ([`SupabaseImageStore`] for Supabase Storage)
//! - [`PostStore`]: creates posts, answers "does a post for this source URL
//!   exist" and lists recent titles ([`BlogApiPostStore`] for the blog API)
//!
//! [`Publisher::publish_all`] walks the articles in reverse curated order so
//! the most important article is created last and carries the newest
//! timestamp. A failure on one article is logged and never stops the rest.
//!
//! # Post Record
//!
//! ```json
//! {
//!   "title": "<headline>",
//!   "slug": "<slugified headline>",
//!   "summary": "<subheading>",
//!   "content": {"body": "<body>"},
//!   "status": "published",
//!   "featured_image_url": "https://.../posts/<slug>-<link hash>.png",
//!   "ai_metadata": {"post_type": "news", "source_url": "...", ...}
//! }
//! ```

use crate::models::{EnrichedArticle, FeaturedImage};
use crate::retry::{RetryPolicy, Transient};
use crate::utils::{slugify_title, truncate_chars, truncate_for_log};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Longest summary the post store accepts.
const SUMMARY_MAX_CHARS: usize = 500;

/// Posts fetched when checking for an existing source URL.
const EXISTS_LOOKBACK: usize = 200;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid image payload: {0}")]
    BadImage(String),
}

impl Transient for PublishError {
    fn is_transient(&self) -> bool {
        match self {
            PublishError::Status { status, .. } => *status == 429 || *status >= 500,
            PublishError::Transport(e) => e.is_timeout() || e.is_connect(),
            PublishError::BadImage(_) => false,
        }
    }
}

async fn check_status(service: &'static str, res: reqwest::Response) -> Result<reqwest::Response, PublishError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(PublishError::Status {
        service,
        status: status.as_u16(),
        body: truncate_for_log(&body, 300),
    })
}

/// Decode a base64 image, tolerating a `data:<mime>;base64,` prefix.
pub fn decode_image_payload(data: &str) -> Result<Vec<u8>, PublishError> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| PublishError::BadImage(e.to_string()))
}

/// Object storage for featured images.
pub trait ImageStore {
    /// Store `bytes` at `path`, replacing any existing object, and return
    /// its public URL.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, PublishError>;
}

/// Persistent store of blog posts.
pub trait PostStore {
    async fn create_post(&self, post: &PostRecord) -> Result<(), PublishError>;

    /// Whether a post whose `ai_metadata.source_url` equals `source_url`
    /// already exists.
    async fn exists_by_source_url(&self, source_url: &str) -> Result<bool, PublishError>;

    /// Titles of the most recent posts, newest first.
    async fn recent_titles(&self, limit: usize) -> Result<Vec<String>, PublishError>;
}

/// Provenance stored with each news post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsMetadata {
    pub post_type: String,
    pub source_url: String,
    pub source: String,
    pub original_title: String,
    pub rex_take: Option<String>,
    pub extraction_method: String,
}

/// Body of a post-create request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: serde_json::Value,
    pub status: String,
    pub featured_image_url: Option<String>,
    pub ai_metadata: NewsMetadata,
}

/// Slug for an article: its headline, else its original title.
pub fn post_slug(article: &EnrichedArticle) -> String {
    let slug = slugify_title(&article.headline);
    if !slug.is_empty() {
        return slug;
    }
    let slug = slugify_title(&article.article().title);
    if slug.is_empty() {
        "news-post".to_string()
    } else {
        slug
    }
}

/// File extension for an image MIME type; unknown types get `png`.
pub fn image_extension(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or(mime_type).trim() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Storage path for an article's image. The link hash keeps two articles
/// with the same headline from overwriting each other's upload.
pub fn image_path(slug: &str, link: &str, mime_type: &str) -> String {
    let digest = hex::encode(Sha256::digest(link.as_bytes()));
    format!("posts/{}-{}.{}", slug, &digest[..8], image_extension(mime_type))
}

impl PostRecord {
    pub fn from_article(article: &EnrichedArticle, slug: String, featured_image_url: Option<String>) -> Self {
        let candidate = article.article();
        PostRecord {
            title: article.headline.clone(),
            slug,
            summary: truncate_chars(&article.subheading, SUMMARY_MAX_CHARS).to_string(),
            content: serde_json::json!({ "body": article.body }),
            status: "published".to_string(),
            featured_image_url,
            ai_metadata: NewsMetadata {
                post_type: "news".to_string(),
                source_url: candidate.link.clone(),
                source: candidate.source.clone(),
                original_title: candidate.title.clone(),
                rex_take: article.rex_take.clone(),
                extraction_method: article.scraped.extraction_method.to_string(),
            },
        }
    }
}

/// [`ImageStore`] backed by the Supabase Storage REST API.
#[derive(Debug, Clone)]
pub struct SupabaseImageStore {
    http: Client,
    base_url: String,
    key: String,
    bucket: String,
}

impl SupabaseImageStore {
    pub fn new(base_url: &str, key: &str, bucket: &str) -> Result<Self, PublishError> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

impl ImageStore for SupabaseImageStore {
    #[instrument(level = "info", skip_all, fields(bucket = %self.bucket, path = %path))]
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, PublishError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let res = self
            .http
            .post(&url)
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        check_status("storage", res).await?;
        Ok(self.public_url(path))
    }
}

#[derive(Debug, Deserialize)]
struct StoredPost {
    title: String,
    #[serde(default)]
    ai_metadata: Option<serde_json::Value>,
}

/// [`PostStore`] backed by the blog's REST API (`/posts`).
#[derive(Debug, Clone)]
pub struct BlogApiPostStore {
    http: Client,
    base_url: String,
}

impl BlogApiPostStore {
    pub fn new(base_url: &str) -> Result<Self, PublishError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<StoredPost>, PublishError> {
        let res = self
            .http
            .get(format!("{}/posts", self.base_url))
            .query(&[("limit", limit)])
            .send()
            .await?;
        Ok(check_status("blog API", res).await?.json().await?)
    }
}

impl PostStore for BlogApiPostStore {
    async fn create_post(&self, post: &PostRecord) -> Result<(), PublishError> {
        let res = self
            .http
            .post(format!("{}/posts", self.base_url))
            .json(post)
            .send()
            .await?;
        check_status("blog API", res).await?;
        Ok(())
    }

    async fn exists_by_source_url(&self, source_url: &str) -> Result<bool, PublishError> {
        let posts = self.list_posts(EXISTS_LOOKBACK).await?;
        Ok(posts.iter().any(|p| {
            p.ai_metadata
                .as_ref()
                .and_then(|m| m.get("source_url"))
                .and_then(|u| u.as_str())
                == Some(source_url)
        }))
    }

    async fn recent_titles(&self, limit: usize) -> Result<Vec<String>, PublishError> {
        Ok(self.list_posts(limit).await?.into_iter().map(|p| p.title).collect())
    }
}

/// What happened to each article in a publish pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Published,
    Skipped,
}

/// Pushes enriched articles into the post store.
pub struct Publisher<S, P> {
    images: Option<S>,
    posts: P,
    retry: RetryPolicy,
}

impl<S: ImageStore, P: PostStore> Publisher<S, P> {
    /// `images` is `None` when no image storage is configured; inline images
    /// are then dropped.
    pub fn new(images: Option<S>, posts: P, retry: RetryPolicy) -> Self {
        Self { images, posts, retry }
    }

    /// Recent post titles for overlap suppression. Errors yield an empty list.
    pub async fn recent_titles(&self, limit: usize) -> Vec<String> {
        match self.posts.recent_titles(limit).await {
            Ok(titles) => {
                info!(count = titles.len(), "Loaded recent post titles");
                titles
            }
            Err(e) => {
                warn!(error = %e, "Could not load recent post titles; continuing without");
                Vec::new()
            }
        }
    }

    /// Publish `articles` in reverse order.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn publish_all(&self, articles: &[EnrichedArticle]) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for article in articles.iter().rev() {
            match self.publish_one(article).await {
                Ok(Outcome::Published) => summary.published += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(link = %article.link(), error = %e, "Failed to publish article");
                    summary.failed += 1;
                }
            }
        }
        info!(
            published = summary.published,
            skipped = summary.skipped,
            failed = summary.failed,
            "Publishing complete"
        );
        summary
    }

    #[instrument(level = "info", skip_all, fields(link = %article.link()))]
    async fn publish_one(&self, article: &EnrichedArticle) -> Result<Outcome, PublishError> {
        let link = article.link();
        if self
            .retry
            .run("post_exists", move |_| self.posts.exists_by_source_url(link))
            .await?
        {
            info!("Post for this source already exists; skipping");
            return Ok(Outcome::Skipped);
        }

        let slug = post_slug(article);
        let featured_image_url = self.resolve_image(article, &slug).await;
        let post = PostRecord::from_article(article, slug, featured_image_url);

        // A failed POST may still have been committed, so retries look for
        // the post before creating it again.
        let post_ref = &post;
        let created = self
            .retry
            .run("create_post", move |attempt| async move {
                if attempt > 0 {
                    match self.posts.exists_by_source_url(link).await {
                        Ok(true) => return Ok(false),
                        Ok(false) => {}
                        Err(e) => return Err(e),
                    }
                }
                self.posts.create_post(post_ref).await.map(|()| true)
            })
            .await?;
        if created {
            info!(title = %post.title, slug = %post.slug, "Published post");
        } else {
            warn!(slug = %post.slug, "Post was stored by a failed attempt; not creating it again");
        }
        Ok(Outcome::Published)
    }

    /// Public URL for the article's image, uploading inline data first.
    /// Upload failures publish the post without an image.
    async fn resolve_image(&self, article: &EnrichedArticle, slug: &str) -> Option<String> {
        match article.featured_image.as_ref()? {
            FeaturedImage::Uploaded { url } => Some(url.clone()),
            FeaturedImage::Inline { mime_type, data_base64 } => {
                let Some(store) = self.images.as_ref() else {
                    warn!("No image store configured; publishing without image");
                    return None;
                };
                let bytes = match decode_image_payload(data_base64) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "Could not decode generated image");
                        return None;
                    }
                };
                let path = image_path(slug, article.link(), mime_type);
                let (path_ref, bytes_ref) = (path.as_str(), &bytes);
                let content_type = mime_type.as_str();
                match self
                    .retry
                    .run("image_upload", move |_| store.upload(path_ref, bytes_ref.clone(), content_type))
                    .await
                {
                    Ok(url) => {
                        info!(%url, "Uploaded featured image");
                        Some(url)
                    }
                    Err(e) => {
                        warn!(error = %e, "Image upload failed; publishing without image");
                        None
                    }
                }
            }
        }
    }
}
