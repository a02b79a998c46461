//! Gemini REST client implementing [`TextModel`] and [`ImageModel`].
//!
//! Uses the `generateContent` endpoint for both text and image generation.
//! The API key is sent in the `x-goog-api-key` header so it never appears in
//! URLs or logs.

use super::{GeneratedImage, ImageModel, LlmError, TextModel, TextRequest};
use crate::config::GeminiConfig;
use crate::utils::truncate_for_log;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<RequestContent>,
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<RequestPart>,
}

#[derive(Serialize, Debug)]
struct RequestPart {
    text: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

#[derive(Deserialize, Debug)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Build a client with its own connection pool.
    pub fn new(api_key: impl Into<String>, config: &GeminiConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.headline_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn call(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<Vec<ResponsePart>, LlmError> {
        let t0 = Instant::now();
        let res = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        debug!(%status, model, elapsed_ms = t0.elapsed().as_millis() as u64, "Gemini response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(truncate_for_log(&body, 300)));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, model, body = %truncate_for_log(&body, 300), "Gemini call failed");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let resp: GenerateContentResponse = res.json().await?;
        if let Some(error) = resp.error {
            if error.status.as_deref() == Some("RESOURCE_EXHAUSTED") {
                return Err(LlmError::RateLimited(error.message));
            }
            return Err(LlmError::Malformed(format!("API error: {}", error.message)));
        }

        let parts = resp
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();
        if parts.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(parts)
    }
}

impl TextModel for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = tracing::field::Empty, user_len = request.user.len()))]
    async fn generate(&self, request: &TextRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.text_model);
        tracing::Span::current().record("model", model);

        let body = GenerateContentRequest {
            system_instruction: (!request.system.is_empty()).then(|| RequestContent {
                role: None,
                parts: vec![RequestPart {
                    text: request.system.clone(),
                }],
            }),
            contents: vec![RequestContent {
                role: Some("user"),
                parts: vec![RequestPart {
                    text: request.user.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: Some(request.max_output_tokens),
                response_mime_type: request.schema.as_ref().map(|_| "application/json"),
                response_schema: request.schema.clone(),
                ..Default::default()
            },
        };

        let parts = self.call(model, &body).await?;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(text)
    }
}

impl ImageModel for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.image_model, aspect_ratio = %aspect_ratio))]
    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<GeneratedImage, LlmError> {
        let body = GenerateContentRequest {
            system_instruction: None,
            contents: vec![RequestContent {
                role: Some("user"),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["TEXT", "IMAGE"]),
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.to_string(),
                }),
                ..Default::default()
            },
        };

        let parts = self.call(&self.image_model, &body).await?;
        for part in parts {
            if let Some(inline) = part.inline_data {
                return Ok(GeneratedImage {
                    mime_type: inline.mime_type,
                    data_base64: inline.data,
                });
            }
            if let Some(text) = part.text {
                debug!(text = %truncate_for_log(&text, 200), "Image model text part");
            }
        }
        Err(LlmError::NoImage)
    }
}
