//! # AI News Desk
//!
//! Turns a week of AI news into a handful of finished blog posts.
//!
//! ## Pipeline
//!
//! 1. **Fetch**: RSS/Atom feeds from AI labs plus a keyword news-search query
//! 2. **Filter**: drop invalid items, dedupe by link, keep the trailing window
//! 3. **Curate**: an LLM picks the significant stories, in priority order
//! 4. **Scrape**: full text via readability, then `<article>` DOM, then the
//!    feed description
//! 5. **Enrich**: LLM headline, subheading and body, plus a generated image
//! 6. **Publish**: upload images and create posts, skipping known sources
//!
//! Every stage absorbs its own failures. A run always produces a
//! [`models::RunReport`], possibly empty.

pub mod cli;
pub mod config;
pub mod curator;
pub mod enricher;
pub mod filter;
pub mod llm;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod scraper;
pub mod sources;
pub mod utils;
