//! HTML parsers for min-repo.com pages.
//!
//! All CSS selector knowledge about the listing site lives in this module.

pub mod date_page;
pub mod hall_page;
pub mod model_page;

pub use date_page::{DatePageParser, ModelLink};
pub use hall_page::{DateLink, HallPage, HallPageParser};
pub use model_page::{ModelPageParser, RawResultRow};

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

use super::normalize::{norm_opt, norm_text};

/// Compile a CSS selector
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector {:?}: {}", css, e))
}

/// Normalized text of the first element matching `selector`, or empty
pub(crate) fn element_text(document: &Html, selector: &Selector) -> String {
    let text = document.select(selector).next().map(|elem| elem.text().collect::<String>());
    norm_opt(text.as_deref())
}

/// Normalized visible text of an element
pub(crate) fn anchor_text(elem: &ElementRef) -> String {
    norm_text(&elem.text().collect::<String>())
}
