//! HTML text extractors used by the scraper's fallback chain.
//!
//! Each extractor returns whatever text it finds; the scraper decides whether
//! it is long enough to accept.

use crate::models::ExtractionMethod;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::io::Cursor;
use tracing::{debug, warn};
use url::Url;

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static ARTICLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static TABLE_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());

/// One strategy for turning page HTML into article text.
pub trait Extractor: Send + Sync {
    /// Tag recorded on articles this extractor produced.
    fn method(&self) -> ExtractionMethod;

    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Extract article text from `html` fetched from `page_url`.
    fn try_extract(&self, html: &str, page_url: &Url) -> Option<String>;
}

/// Collapse runs of whitespace inside each line and drop blank lines.
fn normalize_paragraphs(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize `html` back out with every `<table>` detached from the tree.
///
/// Tables nest, so they are removed on the parsed DOM rather than by text
/// matching.
fn strip_tables(html: &str) -> String {
    let mut doc = Html::parse_document(html);
    let tables: Vec<_> = doc.select(&TABLE_SEL).map(|t| t.id()).collect();
    if tables.is_empty() {
        return html.to_string();
    }
    for id in tables {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
    doc.html()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Boilerplate-stripping extraction using the readability algorithm.
///
/// Tables and HTML comments are removed before scoring.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadabilityExtractor;

impl Extractor for ReadabilityExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Primary
    }

    fn name(&self) -> &'static str {
        "readability"
    }

    fn try_extract(&self, html: &str, page_url: &Url) -> Option<String> {
        let cleaned = COMMENT_RE.replace_all(html, "");
        let cleaned = strip_tables(&cleaned);
        let mut reader = Cursor::new(cleaned.as_bytes());
        match readability::extractor::extract(&mut reader, page_url) {
            Ok(product) => {
                let text = normalize_paragraphs(&product.text);
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                debug!(error = ?e, url = %page_url, "Readability extraction failed");
                None
            }
        }
    }
}

/// DOM-targeted extraction from the page's `<article>` element.
///
/// Text of every prose container inside `<article>` is joined with blank
/// lines. Containers nested inside an already-collected container are
/// skipped. Without any container, the whole `<article>` text is used.
#[derive(Debug, Clone)]
pub struct ArticleDomExtractor {
    body: Option<Selector>,
}

impl ArticleDomExtractor {
    /// Build from CSS selectors for prose containers. Invalid selectors are
    /// logged and ignored.
    pub fn new(body_selectors: &[String]) -> Self {
        let valid: Vec<&str> = body_selectors
            .iter()
            .map(String::as_str)
            .filter(|s| match Selector::parse(s) {
                Ok(_) => true,
                Err(e) => {
                    warn!(selector = %s, error = %e, "Ignoring invalid body selector");
                    false
                }
            })
            .collect();
        let body = if valid.is_empty() {
            None
        } else {
            Selector::parse(&valid.join(", ")).ok()
        };
        Self { body }
    }
}

impl Extractor for ArticleDomExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Secondary
    }

    fn name(&self) -> &'static str {
        "article-dom"
    }

    fn try_extract(&self, html: &str, _page_url: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        let article = document.select(&ARTICLE_SEL).next()?;

        let mut parts = Vec::<String>::new();
        if let Some(body) = &self.body {
            for el in article.select(body) {
                let nested = el
                    .ancestors()
                    .take_while(|a| a.id() != article.id())
                    .filter_map(ElementRef::wrap)
                    .any(|a| body.matches(&a));
                if nested {
                    continue;
                }
                let text = element_text(&el);
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }

        let text = if parts.is_empty() {
            element_text(&article)
        } else {
            parts.join("\n\n")
        };
        (!text.is_empty()).then_some(text)
    }
}
