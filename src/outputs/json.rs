//! JSON run report.
//!
//! One file per run, grouped by local date:
//! `{json_output_dir}/{local_date}/news-{HHMMSS}.json`. Two runs in the same
//! day never overwrite each other unless they start in the same second.

use crate::models::RunReport;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the report file for `report` under `json_output_dir`.
pub fn report_path(report: &RunReport, json_output_dir: &str) -> PathBuf {
    let stamp: String = report.local_time.chars().filter(char::is_ascii_digit).collect();
    PathBuf::from(json_output_dir)
        .join(&report.local_date)
        .join(format!("news-{}.json", stamp))
}

/// Serialize `report` and write it under `json_output_dir`.
///
/// # Arguments
///
/// * `report` - The finished run
/// * `json_output_dir` - Base directory; the date directory is created if needed
///
/// # Returns
///
/// The path written, or an error if serialization, directory creation or the
/// write fails.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    report: &RunReport,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(report, json_output_dir);

    if let Some(dir) = path.parent() {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), articles = report.articles.len(), "Wrote run report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageCounts;

    fn report() -> RunReport {
        RunReport {
            local_date: "2025-06-10".to_string(),
            local_time: "07:15:02".to_string(),
            days_ago: 7,
            top_n: 12,
            counts: StageCounts {
                fetched: 3,
                ..StageCounts::default()
            },
            curation_fallback_reason: None,
            articles: Vec::new(),
        }
    }

    #[test]
    fn test_report_path() {
        let path = report_path(&report(), "/srv/news");
        assert_eq!(path, PathBuf::from("/srv/news/2025-06-10/news-071502.json"));
    }

    #[tokio::test]
    async fn test_write_report_creates_date_dir() {
        let base = std::env::temp_dir().join(format!("ai_news_desk_json_{}", std::process::id()));
        let base_str = base.to_string_lossy().to_string();

        let path = write_report(&report(), &base_str).await.unwrap();
        assert!(path.starts_with(base.join("2025-06-10")));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["local_date"], "2025-06-10");
        assert_eq!(written["counts"]["fetched"], 3);

        std::fs::remove_dir_all(&base).unwrap();
    }
}
