//! Hall overview: payout rate and total medals per hall and day.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::{fetch_records, notice_if_empty};
use crate::config::DashboardConfig;
use crate::dashboard::filters::DayFilters;
use crate::dashboard::format::style_pivot;
use crate::dashboard::table::{date_label, payout_rate, pivot, Agg, PivotSpec};
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, Key, PivotView, SelectView};

pub const DAYS: u64 = 7;

#[derive(Debug, Serialize)]
pub struct HallHistoryPage {
    pub range: DateRangeView,
    pub controls: Vec<SelectView>,
    pub count: usize,
    pub rate: PivotView,
    pub medals: PivotView,
    pub notice: Option<String>,
}

pub fn build(records: &[ResultRecord], ctx: &PageContext, cfg: &DashboardConfig) -> Result<HallHistoryPage> {
    let in_range: Vec<&ResultRecord> = records.iter().filter(|r| ctx.range.contains(r.date)).collect();
    let (days, rows) = DayFilters::resolve(&in_range, &ctx.params);

    let index = |r: &&ResultRecord| vec![Key::from(r.pref.as_str()), Key::from(r.hall.as_str())];
    let column = |r: &&ResultRecord| r.date;
    let label = |d: &NaiveDate| date_label(*d);
    let game = |r: &&ResultRecord| Some(r.game as f64);
    let medal = |r: &&ResultRecord| Some(r.medal as f64);
    let mut spec = PivotSpec {
        index: &index,
        column: &column,
        label: &label,
        value: &game,
        agg: Agg::Sum,
        margins: true,
    };
    let games = pivot(&rows, &spec).reverse_columns();
    spec.value = &medal;
    let medals = pivot(&rows, &spec).reverse_columns();
    // summed games and medals give the unit-weighted mean rate
    let rate = games.zip_with(&medals, payout_rate)?;

    Ok(HallHistoryPage {
        range: ctx.range_view(),
        controls: days.views(),
        count: rows.len(),
        rate: style_pivot("payout rate", &["pref", "hall"], &rate, Some(cfg.payout_highlight), 3),
        medals: style_pivot("medals", &["pref", "hall"], &medals, None, 0),
        notice: notice_if_empty(rows.len()),
    })
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext, cfg: &DashboardConfig) -> Result<HallHistoryPage> {
    let records = fetch_records(fetcher, &ctx.range).await?;
    build(&records, ctx, cfg)
}
