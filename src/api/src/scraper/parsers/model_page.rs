//! Model result page parser for min-repo.com
//!
//! Parses a model's per-unit result table into raw rows. Values stay as the
//! site prints them (thousands separators, signs); coercion happens when the
//! rows are cleaned.

use anyhow::Result;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::date_page::ModelLink;
use super::selector;
use crate::scraper::normalize::norm_text;

/// Header label identifying the unit result table
pub const UNIT_LABEL: &str = "台番";
pub const GAME_LABEL: &str = "G数";
pub const BB_LABEL: &str = "BB";
pub const RB_LABEL: &str = "RB";
pub const MEDAL_LABEL: &str = "差枚";

/// Selector the browser waits for before reading a model page
pub const RESULT_TABLE_SELECTOR: &str = "table";

/// Raw scraped row, serialized with the site's column labels.
///
/// Field order is the fixed column order of the raw results file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResultRow {
    pub pref: Option<String>,
    pub hall: Option<String>,
    pub model: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "台番")]
    pub unit_no: Option<String>,
    #[serde(rename = "G数")]
    pub game: Option<String>,
    #[serde(rename = "BB")]
    pub bb: Option<String>,
    #[serde(rename = "RB")]
    pub rb: Option<String>,
    #[serde(rename = "差枚")]
    pub medal: Option<String>,
}

/// Column labels of the raw results file, in order
pub const RAW_COLUMNS: [&str; 9] = [
    "pref", "hall", "model", "date", UNIT_LABEL, GAME_LABEL, BB_LABEL, RB_LABEL, MEDAL_LABEL,
];

/// Parser for model result pages
pub struct ModelPageParser;

impl ModelPageParser {
    /// Parse model page HTML into one raw row per unit
    pub fn parse(html: &str, link: &ModelLink) -> Result<Vec<RawResultRow>> {
        let document = Html::parse_document(html);
        let table_selector = selector("table")?;
        let row_selector = selector("tr")?;
        let cell_selector = selector("th, td")?;

        let mut rows = Vec::new();

        for table in document.select(&table_selector) {
            let mut trs = table.select(&row_selector);
            let Some(header_row) = trs.next() else {
                continue;
            };
            let labels = cell_texts(&header_row, &cell_selector);
            if !labels.iter().any(|l| l == UNIT_LABEL) {
                continue;
            }
            let index: HashMap<&str, usize> = labels
                .iter()
                .enumerate()
                .map(|(i, l)| (l.as_str(), i))
                .collect();

            for tr in trs {
                let cells = cell_texts(&tr, &cell_selector);
                let get = |label: &str| -> Option<String> {
                    index
                        .get(label)
                        .and_then(|&i| cells.get(i))
                        .filter(|v| !v.is_empty())
                        .cloned()
                };

                // Summary rows (平均, 合計) carry no unit number
                let Some(unit_no) = get(UNIT_LABEL) else {
                    continue;
                };
                if !unit_no.chars().all(|c| c.is_ascii_digit()) {
                    debug!("skipping non-unit row: {}", unit_no);
                    continue;
                }

                rows.push(RawResultRow {
                    pref: Some(link.pref.clone()),
                    hall: Some(link.hall.clone()),
                    model: Some(link.model.clone()),
                    date: Some(link.date.format("%Y-%m-%d").to_string()),
                    unit_no: Some(unit_no),
                    game: get(GAME_LABEL),
                    bb: get(BB_LABEL),
                    rb: get(RB_LABEL),
                    medal: get(MEDAL_LABEL),
                });
            }
            break;
        }

        if rows.is_empty() {
            warn!("No unit rows found: {}", link.model_url);
        } else {
            debug!("{} unit rows for {}", rows.len(), link.model);
        }

        Ok(rows)
    }
}

fn cell_texts(row: &ElementRef, cell_selector: &scraper::Selector) -> Vec<String> {
    row.select(cell_selector)
        .map(|c| norm_text(&c.text().collect::<String>()))
        .collect()
}
