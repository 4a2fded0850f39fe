//! Dashboard pages: one root page and five sub-pages.

pub mod database;
pub mod day_last_stats;
pub mod hall_history;
pub mod model_history;
pub mod top;
pub mod unit_history;

use anyhow::Result;

use super::context::DateRange;
use super::table::ResultRecord;
use crate::storage::fetch::Fetcher;
use crate::storage::RESULT_JOINED;
use crate::types::Key;

/// Shown when a selection leaves no rows
pub const NO_DATA: &str = "データが存在しません。検索条件の見直しをしてください。";

/// Fetch and decode the joined results within `range`
pub async fn fetch_records(fetcher: &Fetcher, range: &DateRange) -> Result<Vec<ResultRecord>> {
    let rows = fetcher
        .fetch(RESULT_JOINED, range.start, range.end, None, None)
        .await?;
    Ok(ResultRecord::from_rows(rows))
}

pub(crate) fn notice_if_empty(rows: usize) -> Option<String> {
    (rows == 0).then(|| NO_DATA.to_string())
}

pub(crate) fn hall_model_key(r: &ResultRecord) -> Vec<Key> {
    vec![Key::from(r.hall.as_str()), Key::from(r.model.as_str())]
}

pub(crate) fn hall_model_unit_key(r: &ResultRecord) -> Vec<Key> {
    vec![
        Key::from(r.hall.as_str()),
        Key::from(r.model.as_str()),
        Key::Int(r.unit_no),
    ]
}
