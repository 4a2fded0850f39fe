//! Hall page parser for min-repo.com
//!
//! Parses a hall's listing page to extract the hall/prefecture labels and
//! the most recent dated result-page links.
//! URL: https://min-repo.com/tag/HALL_SLUG

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::{element_text, selector};

/// Hall name heading
pub const HALL_NAME_SELECTOR: &str = "#content h1";
/// Prefecture label next to the heading
pub const PREFECTURE_SELECTOR: &str = "#content div span.todofuken";
/// Links to the dated result pages, most recent first
pub const DATE_LINK_SELECTOR: &str = "#content div table tbody tr td a";

/// One dated result page of a hall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateLink {
    pub pref: String,
    pub hall: String,
    pub date: NaiveDate,
    pub date_url: String,
}

/// Parsed hall page
#[derive(Debug, Clone, Default)]
pub struct HallPage {
    pub pref: String,
    pub hall: String,
    pub links: Vec<DateLink>,
}

/// Parser for hall pages
pub struct HallPageParser;

impl HallPageParser {
    /// Parse hall page HTML
    ///
    /// Takes the first `min(period, available)` date links in page order.
    /// Date text missing the year is assumed to be in `today`'s year.
    pub fn parse(html: &str, hall_url: &Url, period: usize, today: NaiveDate) -> Result<HallPage> {
        let document = Html::parse_document(html);

        let hall = element_text(&document, &selector(HALL_NAME_SELECTOR)?);
        let pref = element_text(&document, &selector(PREFECTURE_SELECTOR)?);
        info!("Hall: {} / Pref: {}", hall, pref);

        let link_selector = selector(DATE_LINK_SELECTOR)?;
        let dates = ListingDate::new()?;
        let anchors: Vec<_> = document.select(&link_selector).collect();
        let take = period.min(anchors.len());
        debug!("date links found: {}, taking {}", anchors.len(), take);

        let mut links = Vec::with_capacity(take);
        for anchor in anchors.into_iter().take(take) {
            let date_text = super::anchor_text(&anchor);
            let Some(date) = dates.parse(&date_text, today.year()) else {
                warn!("Unparseable date text: {}", date_text);
                continue;
            };

            let href = anchor.value().attr("href").unwrap_or("");
            let date_url = match hall_url.join(href) {
                Ok(u) => u.to_string(),
                Err(e) => {
                    warn!("Invalid date link {:?}: {}", href, e);
                    continue;
                }
            };

            links.push(DateLink {
                pref: pref.clone(),
                hall: hall.clone(),
                date,
                date_url,
            });
        }

        info!("Date links extracted: {}", links.len());
        Ok(HallPage { pref, hall, links })
    }
}

/// "YYYY/M/D" or "M/D" listing text, compiled once per page
pub struct ListingDate {
    re: Regex,
}

impl ListingDate {
    pub fn new() -> Result<Self> {
        Ok(Self {
            re: Regex::new(r"^(?:(\d{4})/)?(\d{1,2})/(\d{1,2})")?,
        })
    }

    /// `None` for text that does not look like a date or names an
    /// impossible day.
    pub fn parse(&self, text: &str, default_year: i32) -> Option<NaiveDate> {
        let caps = self.re.captures(text.trim())?;

        let year = match caps.get(1) {
            Some(y) => y.as_str().parse().unwrap_or(default_year),
            None => default_year,
        };
        let month: u32 = caps[2].parse().unwrap_or(0);
        let day: u32 = caps[3].parse().unwrap_or(0);

        NaiveDate::from_ymd_opt(year, month, day)
    }
}
