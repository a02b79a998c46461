//! Keyword search source against a mocked NewsAPI.

use ai_news_desk::config::NewsApiConfig;
use ai_news_desk::sources::SourceFetcher;
use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> NewsApiConfig {
    NewsApiConfig {
        endpoint: format!("{}/v2/everything", server.uri()),
        ..NewsApiConfig::default()
    }
}

#[tokio::test]
async fn test_search_results_become_candidates() {
    let server = MockServer::start().await;
    let published = (Utc::now() - Duration::days(1)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(header("X-Api-Key", "news-key"))
        .and(query_param("sortBy", "relevancy"))
        .and(query_param("searchIn", "title,description"))
        .and(query_param("language", "en"))
        .and(query_param("pageSize", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "totalResults": 2,
            "articles": [
                {
                    "source": {"id": null, "name": "The Verge"},
                    "title": "Lab unveils new model",
                    "url": "https://verge.example/model",
                    "description": "<b>Bigger</b> and faster",
                    "publishedAt": published
                },
                {
                    "source": {"id": null, "name": "[Removed]"},
                    "title": "[Removed]",
                    "url": "https://removed.com",
                    "description": null,
                    "publishedAt": published
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = SourceFetcher::new(Vec::new(), config(&server), Some("news-key".to_string()), "test").unwrap();
    let articles = fetcher.fetch_all(7, Utc::now()).await;

    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].title, "Lab unveils new model");
    assert_eq!(articles[0].description, "Bigger and faster");
    assert_eq!(articles[0].source, "The Verge via NewsAPI");
    assert!(articles[0].published_date.is_some());
    assert!(!articles[1].is_valid());
}

#[tokio::test]
async fn test_missing_key_skips_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = SourceFetcher::new(Vec::new(), config(&server), None, "test").unwrap();
    assert!(fetcher.fetch_all(7, Utc::now()).await.is_empty());
}

#[tokio::test]
async fn test_error_status_yields_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "code": "apiKeyInvalid",
            "message": "Your API key is invalid."
        })))
        .mount(&server)
        .await;

    let fetcher = SourceFetcher::new(Vec::new(), config(&server), Some("bad".to_string()), "test").unwrap();
    assert!(fetcher.fetch_all(7, Utc::now()).await.is_empty());
}
