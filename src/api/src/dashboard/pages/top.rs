//! Root page: the most recent results and a few counts.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

use super::{fetch_records, notice_if_empty};
use crate::dashboard::format::auto_height;
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, Height, ResultRowView};

pub const DAYS: u64 = 3;

#[derive(Debug, Serialize)]
pub struct TopPage {
    pub range: DateRangeView,
    pub halls: usize,
    pub models: usize,
    pub count: usize,
    pub rows: Vec<ResultRowView>,
    pub height: Height,
    pub notice: Option<String>,
}

pub fn build(records: &[ResultRecord], ctx: &PageContext) -> TopPage {
    let mut rows: Vec<&ResultRecord> = records.iter().filter(|r| ctx.range.contains(r.date)).collect();
    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.hall.cmp(&b.hall))
            .then_with(|| a.model.cmp(&b.model))
            .then_with(|| a.unit_no.cmp(&b.unit_no))
    });

    let halls: BTreeSet<&str> = rows.iter().map(|r| r.hall.as_str()).collect();
    let models: BTreeSet<&str> = rows.iter().map(|r| r.model.as_str()).collect();

    TopPage {
        range: ctx.range_view(),
        halls: halls.len(),
        models: models.len(),
        count: rows.len(),
        height: auto_height(rows.len()),
        notice: notice_if_empty(rows.len()),
        rows: rows.iter().map(|r| r.to_view()).collect(),
    }
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext) -> Result<TopPage> {
    let records = fetch_records(fetcher, &ctx.range).await?;
    Ok(build(&records, ctx))
}
