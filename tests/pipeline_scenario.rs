//! Two mocked feeds through fetch, dedupe, timeframe, curation and scraping.

use ai_news_desk::config::{FeedSource, NewsApiConfig, PipelineConfig};
use ai_news_desk::llm::{GeneratedImage, ImageModel, LlmError, TextModel, TextRequest};
use ai_news_desk::models::ExtractionMethod;
use ai_news_desk::pipeline::NewsPipeline;
use ai_news_desk::retry::RetryPolicy;
use ai_news_desk::scraper::{FetchError, PageFetcher};
use ai_news_desk::sources::SourceFetcher;
use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rss_item(link: &str, title: &str, days_old: i64) -> String {
    format!(
        "<item><title>{}</title><link>{}</link><description>&lt;p&gt;About {}&lt;/p&gt;</description><pubDate>{}</pubDate></item>",
        title,
        link,
        title,
        (Utc::now() - Duration::days(days_old)).to_rfc2822()
    )
}

fn atom_entry(link: &str, title: &str, days_old: i64) -> String {
    format!(
        "<entry><title>{}</title><link href=\"{}\"/><summary>About {}</summary><published>{}</published></entry>",
        title,
        link,
        title,
        (Utc::now() - Duration::days(days_old)).to_rfc3339()
    )
}

/// Flags items 1 and 3; answers every other call with fixed headline fields.
struct EditorModel;

impl TextModel for EditorModel {
    async fn generate(&self, request: &TextRequest) -> Result<String, LlmError> {
        if request.user.contains("News item 1:") {
            return Ok(r#"[
                {"id": 1, "title": "Lab A ships model", "reasoning": "release", "is_relevant_news": true},
                {"id": 2, "title": "Lab A opinion", "reasoning": "opinion", "is_relevant_news": false},
                {"id": 3, "title": "Shared story", "reasoning": "launch", "is_relevant_news": true}
            ]"#
            .to_string());
        }
        Ok(r#"{"headline":"Headline","subheading":"Sub","content":"Body"}"#.to_string())
    }
}

struct NoImages;

impl ImageModel for NoImages {
    async fn generate_image(&self, _prompt: &str, _aspect_ratio: &str) -> Result<GeneratedImage, LlmError> {
        Err(LlmError::NoImage)
    }
}

/// The first story's page is unreachable; every other page has a long article.
struct Pages;

impl PageFetcher for Pages {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        if url.ends_with("/a1") {
            return Err("connection reset".into());
        }
        let paragraph = "The lab released a new open model with longer context, better tool use, and \
            lower serving cost, and published weights alongside a technical report. ";
        Ok(format!(
            "<html><head><title>Story</title></head><body><article><div class=\"prose\"><p>{}</p><p>{}</p><p>{}</p></div></article></body></html>",
            paragraph, paragraph, paragraph
        ))
    }
}

#[tokio::test]
async fn test_two_feeds_to_scraped_articles() {
    let server = MockServer::start().await;

    let feed_a = format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>A</title>{}{}{}</channel></rss>",
        rss_item("https://news.example/a1", "Lab A ships model", 1),
        rss_item("https://news.example/a2", "Lab A opinion", 2),
        rss_item("https://news.example/shared", "Shared story", 30),
    );
    let feed_b = format!(
        "<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"><title>B</title>{}{}</feed>",
        atom_entry("https://news.example/shared", "Shared story", 1),
        atom_entry("https://news.example/b1", "Lab B paper", 3),
    );

    Mock::given(method("GET"))
        .and(path("/a.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed_a))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed_b))
        .mount(&server)
        .await;

    let feeds = vec![
        FeedSource::new("Lab A", &format!("{}/a.xml", server.uri())),
        FeedSource::new("Lab B", &format!("{}/b.xml", server.uri())),
    ];
    let mut config = PipelineConfig::default();
    config.retry.llm = RetryPolicy::none();
    config.images.enabled = false;

    let sources = SourceFetcher::new(feeds, NewsApiConfig::default(), None, "test-agent").unwrap();
    let pipeline = NewsPipeline::new(&config, sources, Pages, EditorModel, NoImages);
    let report = pipeline.run(7, 2, &[]).await;

    assert_eq!(report.counts.fetched, 4);
    assert_eq!(report.counts.unique, 4);
    assert_eq!(report.counts.in_window, 4);
    assert_eq!(report.counts.curated, 2);

    let first = &report.articles[0].scraped;
    assert_eq!(first.article().link, "https://news.example/a1");
    assert_eq!(first.extraction_method, ExtractionMethod::FallbackDescription);
    assert_eq!(first.content, "About Lab A ships model");

    let second = &report.articles[1].scraped;
    assert_eq!(second.article().link, "https://news.example/shared");
    assert_eq!(second.article().source, "Lab B");
    assert_ne!(second.extraction_method, ExtractionMethod::FallbackDescription);
    assert!(second.content.chars().count() >= 200);
}

#[tokio::test]
async fn test_failing_feed_contributes_nothing() {
    let server = MockServer::start().await;
    let feed = format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>{}</channel></rss>",
        rss_item("https://news.example/ok", "Working feed", 1)
    );
    Mock::given(method("GET"))
        .and(path("/ok.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down.xml"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/junk.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss><channel><item><title>"))
        .mount(&server)
        .await;

    let feeds = vec![
        FeedSource::new("Down", &format!("{}/down.xml", server.uri())),
        FeedSource::new("Junk", &format!("{}/junk.xml", server.uri())),
        FeedSource::new("Ok", &format!("{}/ok.xml", server.uri())),
    ];
    let fetcher = SourceFetcher::new(feeds, NewsApiConfig::default(), None, "test-agent").unwrap();
    let articles = fetcher.fetch_all(7, Utc::now()).await;

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].source, "Ok");
}
