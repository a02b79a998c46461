//! LLM text and image generation contracts.
//!
//! The pipeline talks to models only through the [`TextModel`] and
//! [`ImageModel`] traits. [`gemini::GeminiClient`] implements both against the
//! Gemini REST API; tests implement them with in-memory stubs.
//!
//! Structured output is requested by passing a JSON schema in
//! [`TextRequest::schema`]; [`generate_json`] parses the reply and maps parse
//! failures to [`LlmError::Malformed`], which is never retried.

pub mod gemini;

use crate::retry::{RetryPolicy, Transient};
use crate::utils::{looks_truncated, truncate_for_log};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Errors from an LLM call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed model output: {0}")]
    Malformed(String),
    #[error("model returned no content")]
    Empty,
    #[error("model returned no image")]
    NoImage,
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Transport(e) => e.is_timeout() || e.is_connect(),
            LlmError::Malformed(_) | LlmError::Empty | LlmError::NoImage => false,
        }
    }
}

/// One text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    /// Model identifier; `None` uses the client's default text model.
    pub model: Option<String>,
    /// System instructions.
    pub system: String,
    /// User content.
    pub user: String,
    /// JSON schema for structured output. When set, the model is asked for
    /// `application/json`.
    pub schema: Option<serde_json::Value>,
    pub max_output_tokens: u32,
}

impl TextRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: None,
            system: system.into(),
            user: user.into(),
            schema: None,
            max_output_tokens: 2048,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }
}

/// An image returned by an [`ImageModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data_base64: String,
}

/// Text-generation service.
pub trait TextModel {
    /// Generate text for `request`, returning the raw model output.
    async fn generate(&self, request: &TextRequest) -> Result<String, LlmError>;
}

/// Image-generation service.
pub trait ImageModel {
    /// Generate one image from `prompt` with the given aspect ratio
    /// (e.g. `"16:9"`). A text-only reply is [`LlmError::NoImage`].
    async fn generate_image(&self, prompt: &str, aspect_ratio: &str)
    -> Result<GeneratedImage, LlmError>;
}

/// Call `model` with retries on transient errors and parse the reply as `T`.
///
/// A reply that was cut off mid-JSON is asked for once more before giving up.
pub async fn generate_json<M, T>(
    model: &M,
    request: &TextRequest,
    policy: &RetryPolicy,
    label: &str,
) -> Result<T, LlmError>
where
    M: TextModel,
    T: DeserializeOwned,
{
    let raw = policy.run(label, move |_| model.generate(request)).await?;
    match parse_json::<T>(&raw) {
        Ok(value) => Ok(value),
        Err(e) if looks_truncated(&e) => {
            warn!(label, error = %e, "EOF while parsing; re-asking once");
            let raw = policy.run(label, move |_| model.generate(request)).await?;
            parse_json::<T>(&raw).map_err(|e| malformed(&e, &raw))
        }
        Err(e) => Err(malformed(&e, &raw)),
    }
}

/// Call `model` with retries on transient errors, returning trimmed text.
pub async fn generate_text<M: TextModel>(
    model: &M,
    request: &TextRequest,
    policy: &RetryPolicy,
    label: &str,
) -> Result<String, LlmError> {
    let raw = policy.run(label, move |_| model.generate(request)).await?;
    let text = raw.trim();
    if text.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(text.to_string())
}

fn malformed(e: &serde_json::Error, raw: &str) -> LlmError {
    LlmError::Malformed(format!("{} in {}", e, truncate_for_log(raw, 300)))
}

/// Parse model output as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
