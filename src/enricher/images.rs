//! Featured image generation.
//!
//! Two model calls per article: a text model turns the headline and
//! subheading into an image prompt, then the image model renders it. Either
//! step failing leaves the article without an image.
//!
//! Articles are processed in fixed-size batches. Within a batch all articles
//! run concurrently; between consecutive batches the generator sleeps for
//! `batch_delay` to stay under the image quota. There is no delay after the
//! last batch.

use crate::llm::{ImageModel, TextModel, TextRequest, generate_text};
use crate::models::FeaturedImage;
use crate::retry::RetryPolicy;
use crate::utils::truncate_for_log;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Image-generation settings.
#[derive(Debug, Clone)]
pub struct ImageGenerator {
    /// System prompt for the image-prompt call.
    pub prompt: String,
    pub prompt_model: String,
    pub aspect_ratio: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub retry: RetryPolicy,
}

/// Headline and subheading an image is generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSubject {
    pub headline: String,
    pub subheading: String,
}

impl ImageGenerator {
    /// Generate one image per subject, in input order.
    #[instrument(level = "info", skip_all, fields(count = subjects.len(), batch_size = self.batch_size))]
    pub async fn generate_all<T: TextModel, I: ImageModel>(
        &self,
        text: &T,
        image: &I,
        subjects: &[ImageSubject],
    ) -> Vec<Option<FeaturedImage>> {
        let batch_size = self.batch_size.max(1);
        let batches = subjects.len().div_ceil(batch_size);
        let mut images = Vec::with_capacity(subjects.len());

        for (batch, chunk) in subjects.chunks(batch_size).enumerate() {
            if batch > 0 {
                info!(
                    delay_secs = self.batch_delay.as_secs(),
                    next_batch = batch + 1,
                    batches,
                    "Waiting between image batches"
                );
                sleep(self.batch_delay).await;
            }
            info!(batch = batch + 1, batches, size = chunk.len(), "Generating image batch");
            let results = join_all(chunk.iter().map(|s| self.generate_one(text, image, s))).await;
            images.extend(results);
        }

        let generated = images.iter().filter(|i| i.is_some()).count();
        info!(total = subjects.len(), generated, "Image generation complete");
        images
    }

    #[instrument(level = "info", skip_all, fields(headline = %subject.headline))]
    async fn generate_one<T: TextModel, I: ImageModel>(
        &self,
        text: &T,
        image: &I,
        subject: &ImageSubject,
    ) -> Option<FeaturedImage> {
        let request = TextRequest::new(
            self.prompt.clone(),
            format!(
                "Article:\nHeadline: {}\nSubheading: {}\n",
                subject.headline, subject.subheading
            ),
        )
        .with_model(self.prompt_model.clone());

        let prompt = match generate_text(text, &request, &self.retry, "image_prompt").await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to generate image prompt");
                return None;
            }
        };
        info!(prompt = %truncate_for_log(&prompt, 100), "Generated image prompt");

        let prompt = prompt.as_str();
        let aspect_ratio = self.aspect_ratio.as_str();
        match self
            .retry
            .run("image", move |_| image.generate_image(prompt, aspect_ratio))
            .await
        {
            Ok(generated) => {
                info!(mime_type = %generated.mime_type, bytes_b64 = generated.data_base64.len(), "Image generated");
                Some(FeaturedImage::Inline {
                    mime_type: generated.mime_type,
                    data_base64: generated.data_base64,
                })
            }
            Err(e) => {
                warn!(error = %e, "Failed to generate image");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GeneratedImage, LlmError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PromptModel;

    impl TextModel for PromptModel {
        async fn generate(&self, request: &TextRequest) -> Result<String, LlmError> {
            if request.user.contains("Headline: no-prompt") {
                return Err(LlmError::Status {
                    status: 400,
                    body: "bad".into(),
                });
            }
            Ok(format!("An illustration. {}", request.user))
        }
    }

    struct CountingImageModel {
        calls: AtomicUsize,
    }

    impl ImageModel for CountingImageModel {
        async fn generate_image(
            &self,
            prompt: &str,
            aspect_ratio: &str,
        ) -> Result<GeneratedImage, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(aspect_ratio, "16:9");
            if prompt.contains("text-only") {
                return Err(LlmError::NoImage);
            }
            Ok(GeneratedImage {
                mime_type: "image/png".to_string(),
                data_base64: "aGVsbG8=".to_string(),
            })
        }
    }

    fn generator(batch_size: usize) -> ImageGenerator {
        ImageGenerator {
            prompt: "Describe an image.".to_string(),
            prompt_model: "prompt-model".to_string(),
            aspect_ratio: "16:9".to_string(),
            batch_size,
            batch_delay: Duration::from_secs(60),
            retry: RetryPolicy::none(),
        }
    }

    fn subjects(headlines: &[&str]) -> Vec<ImageSubject> {
        headlines
            .iter()
            .map(|h| ImageSubject {
                headline: h.to_string(),
                subheading: "sub".to_string(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_batches() {
        let image = CountingImageModel {
            calls: AtomicUsize::new(0),
        };
        let names: Vec<String> = (0..14).map(|i| format!("story {}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let start = tokio::time::Instant::now();
        let images = generator(6)
            .generate_all(&PromptModel, &image, &subjects(&refs))
            .await;

        assert_eq!(images.len(), 14);
        assert!(images.iter().all(Option::is_some));
        assert_eq!(image.calls.load(Ordering::SeqCst), 14);
        // batches of 6, 6, 2: two pauses, none after the last batch
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_batch_has_no_delay() {
        let image = CountingImageModel {
            calls: AtomicUsize::new(0),
        };
        let start = tokio::time::Instant::now();
        let images = generator(6)
            .generate_all(&PromptModel, &image, &subjects(&["a", "b", "c", "d", "e", "f"]))
            .await;
        assert_eq!(images.len(), 6);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_failures_yield_none_in_place() {
        let image = CountingImageModel {
            calls: AtomicUsize::new(0),
        };
        let images = generator(6)
            .generate_all(&PromptModel, &image, &subjects(&["ok", "no-prompt", "text-only"]))
            .await;

        assert!(matches!(images[0], Some(FeaturedImage::Inline { ref mime_type, .. }) if mime_type == "image/png"));
        assert_eq!(images[1], None);
        assert_eq!(images[2], None);
        // the prompt failure never reaches the image model
        assert_eq!(image.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let image = CountingImageModel {
            calls: AtomicUsize::new(0),
        };
        let images = generator(6).generate_all(&PromptModel, &image, &[]).await;
        assert!(images.is_empty());
    }
}
