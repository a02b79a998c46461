//! Editorial enrichment of scraped articles.
//!
//! Headlines are written first, since image prompts are derived from them.
//! Both steps recover locally, so [`Enricher::enrich`] returns exactly one
//! [`EnrichedArticle`] per input.

pub mod headlines;
pub mod images;

use crate::llm::{ImageModel, TextModel};
use crate::models::{EnrichedArticle, ScrapedArticle};
use headlines::HeadlineWriter;
use images::{ImageGenerator, ImageSubject};
use tracing::{info, instrument};

/// Headline writer plus an optional image generator.
#[derive(Debug, Clone)]
pub struct Enricher {
    pub headlines: HeadlineWriter,
    /// `None` disables image generation.
    pub images: Option<ImageGenerator>,
}

impl Enricher {
    #[instrument(level = "info", skip_all, fields(count = scraped.len()))]
    pub async fn enrich<T: TextModel, I: ImageModel>(
        &self,
        text: &T,
        image: &I,
        scraped: Vec<ScrapedArticle>,
    ) -> Vec<EnrichedArticle> {
        let fields = self.headlines.write_all(text, &scraped).await;

        let images = match &self.images {
            Some(generator) => {
                let subjects: Vec<ImageSubject> = fields
                    .iter()
                    .map(|f| ImageSubject {
                        headline: f.headline.clone(),
                        subheading: f.subheading.clone(),
                    })
                    .collect();
                generator.generate_all(text, image, &subjects).await
            }
            None => {
                info!("Image generation disabled");
                vec![None; scraped.len()]
            }
        };

        scraped
            .into_iter()
            .zip(fields)
            .zip(images)
            .map(|((scraped, f), featured_image)| EnrichedArticle {
                scraped,
                headline: f.headline,
                subheading: f.subheading,
                body: f.content,
                rex_take: f.rex_take,
                featured_image,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GeneratedImage, LlmError, TextRequest};
    use crate::models::{CandidateArticle, CuratedArticle, ExtractionMethod, FeaturedImage};
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    struct FixedText;

    impl TextModel for FixedText {
        async fn generate(&self, request: &TextRequest) -> Result<String, LlmError> {
            if request.schema.is_some() {
                Ok(r#"{"headline":"H","subheading":"S","content":"B","rex_take":"Wry."}"#.to_string())
            } else {
                Ok("a prompt".to_string())
            }
        }
    }

    struct FixedImage;

    impl ImageModel for FixedImage {
        async fn generate_image(&self, _p: &str, _a: &str) -> Result<GeneratedImage, LlmError> {
            Ok(GeneratedImage {
                mime_type: "image/png".to_string(),
                data_base64: "aGk=".to_string(),
            })
        }
    }

    fn scraped(n: usize) -> Vec<ScrapedArticle> {
        (0..n)
            .map(|i| ScrapedArticle {
                curated: CuratedArticle {
                    article: CandidateArticle {
                        title: format!("T{}", i),
                        link: format!("https://news.example/{}", i),
                        description: "d".to_string(),
                        published_date: None,
                        summary: String::new(),
                        source: "Feed".to_string(),
                    },
                    candidate_index: i,
                    rationale: None,
                },
                content: "content".to_string(),
                extraction_method: ExtractionMethod::Secondary,
            })
            .collect()
    }

    fn enricher(images: bool) -> Enricher {
        Enricher {
            headlines: HeadlineWriter {
                prompt: "h".to_string(),
                model: "m".to_string(),
                max_output_tokens: 2048,
                max_content_chars: 10_000,
                retry: RetryPolicy::none(),
            },
            images: images.then(|| ImageGenerator {
                prompt: "i".to_string(),
                prompt_model: "m".to_string(),
                aspect_ratio: "16:9".to_string(),
                batch_size: 6,
                batch_delay: Duration::from_secs(60),
                retry: RetryPolicy::none(),
            }),
        }
    }

    #[tokio::test]
    async fn test_enrich_assembles_records() {
        let out = enricher(true).enrich(&FixedText, &FixedImage, scraped(2)).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].link(), "https://news.example/1");
        assert_eq!(out[0].headline, "H");
        assert_eq!(out[0].body, "B");
        assert_eq!(out[0].rex_take.as_deref(), Some("Wry."));
        assert!(matches!(out[0].featured_image, Some(FeaturedImage::Inline { .. })));
    }

    #[tokio::test]
    async fn test_enrich_without_images() {
        let out = enricher(false).enrich(&FixedText, &FixedImage, scraped(3)).await;
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|a| a.featured_image.is_none()));
    }
}
