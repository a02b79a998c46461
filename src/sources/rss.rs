//! RSS 2.0 and Atom feed fetching and parsing (quick-xml 0.38).
//!
//! Both formats are read by one streaming parser:
//!
//! | Field       | RSS 2.0                         | Atom                     |
//! |-------------|---------------------------------|--------------------------|
//! | entry       | `<item>`                        | `<entry>`                |
//! | link        | `<link>` text                   | `<link href="...">`      |
//! | description | `<description>`                 | `<summary>`              |
//! | body        | `<content:encoded>`             | `<content>`              |
//! | date        | `<pubDate>`, then `<dc:date>`   | `<published>`, then `<updated>` |
//!
//! Descriptions are converted to plain text. Entries without a parseable date
//! are parsed but never fall inside a window.

use super::SourceError;
use crate::config::FeedSource;
use crate::models::CandidateArticle;
use crate::utils::strip_html;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, escape};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Published,
    Updated,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" | b"summary" => Some(Field::Description),
            b"content:encoded" | b"content" => Some(Field::Content),
            b"pubDate" | b"published" => Some(Field::Published),
            b"dc:date" | b"updated" => Some(Field::Updated),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    link: String,
    description: String,
    content: String,
    published: String,
    updated: String,
}

impl RawEntry {
    fn push(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::Content => &mut self.content,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
        };
        slot.push_str(text);
    }

    fn into_candidate(self, source: &str) -> CandidateArticle {
        let description = strip_html(&self.description);
        let content = strip_html(&self.content);
        let description = if description.is_empty() {
            content.clone()
        } else {
            description
        };
        let summary = if content.is_empty() {
            description.clone()
        } else {
            content
        };
        let date = if self.published.trim().is_empty() {
            &self.updated
        } else {
            &self.published
        };
        CandidateArticle {
            title: strip_html(&self.title),
            link: self.link.trim().to_string(),
            description,
            published_date: parse_feed_date(date),
            summary,
            source: source.to_string(),
        }
    }
}

/// Parse a feed timestamp into UTC.
///
/// Accepts RFC 2822 (`Tue, 10 Jun 2025 09:00:00 GMT`), RFC 3339
/// (`2025-06-10T09:00:00+02:00`) and naive ISO-8601 forms, which are
/// treated as UTC.
pub fn parse_feed_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// Atom `<link>` carries its URL in `href`; only the alternate link counts.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"rel" => rel = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    escape::resolve_predefined_entity(name).map(str::to_string)
}

/// Parse RSS or Atom XML into candidate articles labeled with `source`.
///
/// Entries without a link or title are kept here; validity filtering happens
/// in the deduplicator.
pub fn parse_feed(xml: &[u8], source: &str) -> Result<Vec<CandidateArticle>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::<u8>::new();

    let mut entries = Vec::<CandidateArticle>::new();
    let mut current: Option<RawEntry> = None;
    let mut field: Option<(Field, Vec<u8>)> = None;
    // Open elements below the current entry; fields are only read from
    // direct children, so nested blocks like Atom `<source>` are ignored.
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if current.is_none() {
                    if is_entry(&name) {
                        current = Some(RawEntry::default());
                        field = None;
                        depth = 0;
                    }
                } else if let Some(entry) = current.as_mut() {
                    depth += 1;
                    if depth == 1 {
                        if let Some(f) = Field::from_name(&name) {
                            if f == Field::Link {
                                if let Some(href) = atom_href(&e) {
                                    if entry.link.is_empty() {
                                        entry.link = href;
                                    }
                                }
                            }
                            field = Some((f, name));
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    if depth == 0 && e.name().as_ref() == b"link" && entry.link.is_empty() {
                        if let Some(href) = atom_href(&e) {
                            entry.link = href;
                        }
                    }
                }
            }
            Event::End(e) if current.is_some() => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        field = None;
                    }
                } else if is_entry(e.name().as_ref()) {
                    if let Some(entry) = current.take() {
                        entries.push(entry.into_candidate(source));
                    }
                    field = None;
                }
            }
            Event::Text(t) => {
                if let (Some(entry), Some((f, _))) = (current.as_mut(), field.as_ref()) {
                    let raw = String::from_utf8_lossy(&t);
                    let text = escape::unescape(&raw)
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| raw.to_string());
                    entry.push(*f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(entry), Some((f, _))) = (current.as_mut(), field.as_ref()) {
                    entry.push(*f, &String::from_utf8_lossy(&c));
                }
            }
            Event::GeneralRef(r) => {
                if let (Some(entry), Some((f, _))) = (current.as_mut(), field.as_ref()) {
                    let name = String::from_utf8_lossy(&r);
                    match resolve_entity(&name) {
                        Some(resolved) => entry.push(*f, &resolved),
                        None => entry.push(*f, &format!("&{};", name)),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

/// Fetch one feed and keep the entries published at or after `since`.
#[instrument(level = "info", skip_all, fields(source = %feed.name))]
pub async fn fetch_feed(
    http: &Client,
    feed: &FeedSource,
    since: DateTime<Utc>,
) -> Result<Vec<CandidateArticle>, SourceError> {
    let res = http.get(&feed.url).send().await?;
    let status = res.status();
    debug!(%status, url = %feed.url, "Feed response");
    let res = res.error_for_status()?;
    let bytes = res.bytes().await?;

    let entries = parse_feed(&bytes, &feed.name)?;
    let total = entries.len();
    let undated = entries.iter().filter(|a| a.published_date.is_none()).count();
    if undated > 0 {
        warn!(undated, "Feed entries without a parseable date");
    }

    let articles: Vec<CandidateArticle> = entries
        .into_iter()
        .filter(|a| a.published_date.is_some_and(|d| d >= since))
        .collect();

    info!(total, count = articles.len(), "Found relevant articles in feed");
    Ok(articles)
}
