//! Per-model history: mean games and payout rate by hall and model over
//! the last ten days.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::{fetch_records, hall_model_key, notice_if_empty};
use crate::config::DashboardConfig;
use crate::dashboard::filters::{distinct, filter_by, with_all_first, with_all_last, Control, DayFilters};
use crate::dashboard::format::style_pivot;
use crate::dashboard::table::{date_label, mean, payout_rate, pivot, Agg, PivotSpec};
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, PivotView, SelectView};

pub const DAYS: u64 = 10;

#[derive(Debug, Serialize)]
pub struct ModelHistoryPage {
    pub range: DateRangeView,
    pub controls: Vec<SelectView>,
    pub count: usize,
    /// Mean games over every selected row
    pub game_mean: Option<f64>,
    pub rate: PivotView,
    pub games: PivotView,
    pub notice: Option<String>,
}

pub fn build(records: &[ResultRecord], ctx: &PageContext, cfg: &DashboardConfig) -> Result<ModelHistoryPage> {
    let in_range: Vec<&ResultRecord> = records.iter().filter(|r| ctx.range.contains(r.date)).collect();

    let hall = Control::new(
        "hall",
        with_all_last(distinct(&in_range, |r| r.hall.clone())),
        ctx.param("hall"),
    );
    let rows = filter_by(&in_range, &hall.selection, |r| r.hall.clone());

    let model = Control::new(
        "model",
        with_all_first(distinct(&rows, |r| r.model.clone())),
        ctx.param("model"),
    );
    let rows = filter_by(&rows, &model.selection, |r| r.model.clone());

    let (days, rows) = DayFilters::resolve(&rows, &ctx.params);

    let column = |r: &&ResultRecord| r.date;
    let label = |d: &NaiveDate| date_label(*d);
    let index = |r: &&ResultRecord| hall_model_key(r);
    let game = |r: &&ResultRecord| Some(r.game as f64);
    let medal = |r: &&ResultRecord| Some(r.medal as f64);
    let mut spec = PivotSpec {
        index: &index,
        column: &column,
        label: &label,
        value: &game,
        agg: Agg::Mean,
        margins: true,
    };
    let games = pivot(&rows, &spec).reverse_columns();
    spec.value = &medal;
    let medals = pivot(&rows, &spec).reverse_columns();
    let rate = games.zip_with(&medals, payout_rate)?;

    let game_values: Vec<f64> = rows.iter().map(|r| r.game as f64).collect();
    let game_mean = mean(&game_values);
    let game_threshold = game_mean.map(|m| m * cfg.game_highlight_factor);

    let mut controls = vec![hall.view(), model.view()];
    controls.extend(days.views());

    Ok(ModelHistoryPage {
        range: ctx.range_view(),
        controls,
        count: rows.len(),
        game_mean,
        rate: style_pivot("payout rate", &["hall", "model"], &rate, Some(cfg.payout_highlight), 3),
        games: style_pivot("games", &["hall", "model"], &games, game_threshold, 1),
        notice: notice_if_empty(rows.len()),
    })
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext, cfg: &DashboardConfig) -> Result<ModelHistoryPage> {
    let records = fetch_records(fetcher, &ctx.range).await?;
    build(&records, ctx, cfg)
}
