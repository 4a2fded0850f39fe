//! Web scraper module for min-repo.com
//!
//! Provides browser automation, HTML parsing, and the per-hall result
//! aggregation that produces the raw results file.

pub mod aggregator;
pub mod browser;
pub mod normalize;
pub mod parsers;

pub use aggregator::{scrape_all_halls, ScrapeReport};
pub use browser::{ChromeSessionFactory, PageSession, SessionFactory};

use anyhow::{Context, Result};
use url::Url;

/// Base URL for min-repo.com
pub const BASE_URL: &str = "https://min-repo.com";

/// Build hall listing URL
pub fn hall_url(base_url: &str, slug: &str) -> Result<Url> {
    let raw = format!(
        "{}/tag/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(slug)
    );
    Url::parse(&raw).with_context(|| format!("Invalid hall URL: {}", raw))
}
