//! Deduplication and the trailing-window filter.
//!
//! Both are pure functions over the fetched collection; neither performs I/O.

use crate::models::CandidateArticle;
use crate::sources::window_start;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::{debug, info};

/// Collapse candidates to one entry per `link`, keeping the first occurrence.
///
/// Invalid items (empty or sentinel link, empty or retracted title) are
/// dropped first. Applying `dedupe` to its own output returns it unchanged.
pub fn dedupe(articles: Vec<CandidateArticle>) -> Vec<CandidateArticle> {
    let total = articles.len();
    let (valid, invalid): (Vec<_>, Vec<_>) = articles.into_iter().partition(|a| a.is_valid());
    for a in &invalid {
        debug!(title = %a.title, link = %a.link, source = %a.source, "Dropping invalid article");
    }

    let unique: Vec<CandidateArticle> = valid
        .into_iter()
        .unique_by(|a| a.link.trim().to_string())
        .collect();

    info!(
        total,
        invalid = invalid.len(),
        unique = unique.len(),
        "Deduplicated articles"
    );
    unique
}

/// Whether `published` falls in the `days`-day window ending at `now`.
///
/// The boundary is inclusive. Items without a timestamp are outside every
/// window.
pub fn within_window(published: Option<DateTime<Utc>>, now: DateTime<Utc>, days: u32) -> bool {
    published.is_some_and(|p| p >= window_start(now, days))
}

/// Keep only articles published within the trailing window.
pub fn filter_timeframe(
    articles: Vec<CandidateArticle>,
    now: DateTime<Utc>,
    days: u32,
) -> Vec<CandidateArticle> {
    let before = articles.len();
    let kept: Vec<CandidateArticle> = articles
        .into_iter()
        .filter(|a| within_window(a.published_date, now, days))
        .collect();
    info!(before, after = kept.len(), days, "Applied timeframe filter");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn article(link: &str, source: &str) -> CandidateArticle {
        CandidateArticle {
            title: format!("Title for {}", link),
            link: link.to_string(),
            description: "d".to_string(),
            published_date: None,
            summary: "d".to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first_seen() {
        let input = vec![
            article("https://a.example/1", "A"),
            article("https://a.example/2", "A"),
            article("https://a.example/1", "B"),
            article("https://a.example/3", "B"),
        ];
        let out = dedupe(input);
        let links: Vec<&str> = out.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(
            links,
            vec!["https://a.example/1", "https://a.example/2", "https://a.example/3"]
        );
        assert_eq!(out[0].source, "A");
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let input = vec![
            article("https://a.example/1", "A"),
            article("https://a.example/1", "B"),
            article("N/A", "B"),
            article("https://a.example/2", "C"),
            article("https://a.example/2", "C"),
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_dedupe_drops_invalid() {
        let mut removed = article("https://x.example/r", "NewsAPI");
        removed.title = "[Removed]".to_string();
        let input = vec![
            article("", "A"),
            article("https://removed.com", "A"),
            removed,
            article("https://ok.example/1", "A"),
        ];
        let out = dedupe(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link, "https://ok.example/1");
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let boundary = now - Duration::days(7);
        assert!(within_window(Some(boundary), now, 7));
        assert!(!within_window(
            Some(boundary - Duration::microseconds(1)),
            now,
            7
        ));
        assert!(within_window(Some(now), now, 7));
        assert!(!within_window(None, now, 7));
    }

    #[test]
    fn test_filter_timeframe() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();
        let mut fresh = article("https://a.example/fresh", "A");
        fresh.published_date = Some(now - Duration::days(1));
        let mut stale = article("https://a.example/stale", "A");
        stale.published_date = Some(now - Duration::days(30));
        let undated = article("https://a.example/undated", "A");

        let out = filter_timeframe(vec![fresh.clone(), stale, undated], now, 7);
        assert_eq!(out, vec![fresh]);
    }
}
