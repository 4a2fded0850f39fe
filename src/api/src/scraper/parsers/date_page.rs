//! Date page parser for min-repo.com
//!
//! Parses a hall's dated result page to extract per-model result links,
//! keeping only models of the target family.

use anyhow::Result;
use chrono::NaiveDate;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::hall_page::DateLink;
use super::{anchor_text, element_text, selector};
use crate::scraper::normalize::extract_model_name;

/// Model links table
pub const MODEL_LINK_SELECTOR: &str = "table.kishu tbody tr td a";
const TITLE_SELECTOR: &str = "h1";

/// One model's unit table for a hall and date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLink {
    pub pref: String,
    pub hall: String,
    pub date: NaiveDate,
    pub date_url: String,
    pub model_url: String,
    /// Model name derived from the link label
    pub model: String,
}

/// Parser for date pages
pub struct DatePageParser;

impl DatePageParser {
    /// Parse date page HTML
    ///
    /// Returns links whose visible text contains `family`. No matching link
    /// is a normal outcome.
    pub fn parse(html: &str, date_link: &DateLink, family: &str) -> Result<Vec<ModelLink>> {
        let document = Html::parse_document(html);

        let title = element_text(&document, &selector(TITLE_SELECTOR)?);
        debug!("Page title: {}", title);

        let base = Url::parse(&date_link.date_url)?;
        let link_selector = selector(MODEL_LINK_SELECTOR)?;

        let mut links = Vec::new();
        for anchor in document.select(&link_selector) {
            let label = anchor_text(&anchor);
            if !label.contains(family) {
                continue;
            }

            let href = anchor.value().attr("href").unwrap_or("");
            let model_url = match base.join(href) {
                Ok(u) => u.to_string(),
                Err(e) => {
                    warn!("Invalid model link {:?}: {}", href, e);
                    continue;
                }
            };

            links.push(ModelLink {
                pref: date_link.pref.clone(),
                hall: date_link.hall.clone(),
                date: date_link.date,
                date_url: date_link.date_url.clone(),
                model_url,
                model: extract_model_name(&label),
            });
        }

        if links.is_empty() {
            warn!("No model links matching {:?}: {}", family, date_link.date_url);
        } else {
            info!("Model links extracted: {}", links.len());
        }

        Ok(links)
    }
}
