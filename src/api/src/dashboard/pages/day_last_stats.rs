//! Day-last statistics: how each active unit does on days ending in each
//! digit, over the three months before the current one.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::{fetch_records, notice_if_empty};
use crate::config::DashboardConfig;
use crate::dashboard::context::DateRange;
use crate::dashboard::filters::{with_all_inserted, Control};
use crate::dashboard::format::auto_height;
use crate::dashboard::table::{group_by, mean, payout_rate, ratio, round_to, std_dev};
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, Height, SelectView};

/// Months of history before the current month
pub const MONTHS: u32 = 3;
/// Units must have played within this many days
pub const ACTIVE_DAYS: u64 = 3;
pub const MIN_GAME_MEAN: f64 = 3000.0;
pub const MIN_COUNT: usize = 3;
pub const DEFAULT_WIN_RATE: f64 = 0.51;

type UnitKey = (String, String, i64);

/// Aggregates of one unit on one day-last digit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLastStat {
    pub day_last: u32,
    pub hall: String,
    pub model: String,
    pub unit_no: i64,
    pub win_rate: f64,
    pub count: usize,
    pub game: i64,
    pub game_m: f64,
    pub game_std: Option<f64>,
    pub medal: i64,
    pub medals_m: f64,
    pub medal_rate: Option<f64>,
    pub bb: i64,
    pub bb_rate: Option<f64>,
    pub rb: i64,
    pub rb_rate: Option<f64>,
    /// RB coefficient of variation
    pub cv: Option<f64>,
}

/// One play of the selected unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    pub hall: String,
    pub model: String,
    pub unit_no: i64,
    pub date: NaiveDate,
    pub game: i64,
    pub medal: i64,
    pub medal_rate: Option<f64>,
    pub bb: i64,
    pub rb: i64,
    pub bb_rate: Option<f64>,
    pub rb_rate: Option<f64>,
    pub total_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DayLastStatsPage {
    pub range: DateRangeView,
    pub controls: Vec<SelectView>,
    pub win_rate: f64,
    pub rows: Vec<DayLastStat>,
    pub height: Height,
    /// Present when both hall and day are specific
    pub detail: Option<Vec<DetailRow>>,
    pub notice: Option<String>,
}

/// Context over the previous three whole months
pub fn context(today: NaiveDate, params: HashMap<String, String>) -> Result<PageContext> {
    let defaults = DateRange::previous_months(today, MONTHS);
    let ctx = PageContext::new(today, defaults, defaults.end, params)?;
    win_rate_param(&ctx)?;
    Ok(ctx)
}

/// Range whose units count as active
pub fn active_range(today: NaiveDate) -> DateRange {
    DateRange::default_for(today, ACTIVE_DAYS)
}

fn win_rate_param(ctx: &PageContext) -> Result<f64> {
    match ctx.param("win_rate").map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => {
            let v: f64 = s
                .parse()
                .with_context(|| format!("Invalid win_rate: {:?}", s))?;
            Ok(v.clamp(0.0, 1.0))
        }
        None => Ok(DEFAULT_WIN_RATE),
    }
}

/// Statistics per (hall, model, unit, day-last digit)
pub fn day_last_stats(records: &[&ResultRecord], cfg: &DashboardConfig) -> Vec<DayLastStat> {
    let groups = group_by(records, |r| (r.hall.clone(), r.model.clone(), r.unit_no, r.day_last()));

    groups
        .into_iter()
        .map(|((hall, model, unit_no, day_last), members)| {
            let games: Vec<f64> = members.iter().map(|r| r.game as f64).collect();
            let medals: Vec<f64> = members.iter().map(|r| r.medal as f64).collect();
            let rbs: Vec<f64> = members.iter().map(|r| r.rb as f64).collect();
            let count = members.len();
            let wins = members
                .iter()
                .filter(|r| matches!(r.payout_rate(), Some(p) if round_to(p, 3) > cfg.win_payout_rate))
                .count();

            let game: i64 = members.iter().map(|r| r.game).sum();
            let medal: i64 = members.iter().map(|r| r.medal).sum();
            let bb: i64 = members.iter().map(|r| r.bb).sum();
            let rb: i64 = members.iter().map(|r| r.rb).sum();
            let cv = match (std_dev(&rbs), mean(&rbs)) {
                (Some(s), Some(m)) => ratio(s, m).map(|v| round_to(v, 3)),
                _ => None,
            };

            DayLastStat {
                day_last,
                hall,
                model,
                unit_no,
                win_rate: round_to(wins as f64 / count as f64, 2),
                count,
                game,
                game_m: mean(&games).map(|v| round_to(v, 1)).unwrap_or(0.0),
                game_std: std_dev(&games).map(|v| round_to(v, 1)),
                medal,
                medals_m: mean(&medals).map(|v| round_to(v, 1)).unwrap_or(0.0),
                medal_rate: payout_rate(game as f64, medal as f64).map(|v| round_to(v, 3)),
                bb,
                bb_rate: ratio(game as f64, bb as f64).map(|v| round_to(v, 1)),
                rb,
                rb_rate: ratio(game as f64, rb as f64).map(|v| round_to(v, 1)),
                cv,
            }
        })
        .collect()
}

/// Day digits starting from tomorrow's
pub fn day_options(digits: &BTreeSet<u32>, today: NaiveDate) -> Vec<String> {
    let first = (today.day() + 1) % 10;
    let (later, earlier): (Vec<u32>, Vec<u32>) = digits.iter().copied().partition(|d| *d >= first);
    with_all_inserted(later.into_iter().chain(earlier).map(|d| d.to_string()).collect())
}

/// `history` covers the window, `active` the last few days
pub fn build(
    history: &[ResultRecord],
    active: &[ResultRecord],
    ctx: &PageContext,
    cfg: &DashboardConfig,
) -> DayLastStatsPage {
    let active_keys: HashSet<UnitKey> = active
        .iter()
        .map(|r| (r.hall.clone(), r.model.clone(), r.unit_no))
        .collect();
    let records: Vec<&ResultRecord> = history
        .iter()
        .filter(|r| ctx.range.contains(r.date))
        .filter(|r| active_keys.contains(&(r.hall.clone(), r.model.clone(), r.unit_no)))
        .collect();

    let win_rate = win_rate_param(ctx).unwrap_or(DEFAULT_WIN_RATE);
    let stats: Vec<DayLastStat> = day_last_stats(&records, cfg)
        .into_iter()
        .filter(|s| s.game_m >= MIN_GAME_MEAN && s.count >= MIN_COUNT && s.win_rate >= win_rate)
        .collect();

    let halls: BTreeSet<&str> = stats.iter().map(|s| s.hall.as_str()).collect();
    let hall = Control::new(
        "hall",
        with_all_inserted(halls.into_iter().map(String::from).collect()),
        ctx.param("hall"),
    );
    let digits: BTreeSet<u32> = stats.iter().map(|s| s.day_last).collect();
    let day = Control::new("day", day_options(&digits, ctx.today), ctx.param("day"));

    let mut rows: Vec<DayLastStat> = stats
        .into_iter()
        .filter(|s| hall.selection.matches(&s.hall) && day.selection.matches(&s.day_last.to_string()))
        .collect();
    rows.sort_by(|a, b| {
        a.day_last
            .cmp(&b.day_last)
            .then_with(|| a.hall.cmp(&b.hall))
            .then_with(|| a.model.cmp(&b.model))
            .then_with(|| a.unit_no.cmp(&b.unit_no))
    });

    let height = if hall.selection.is_all() || day.selection.is_all() {
        Height::Auto
    } else {
        auto_height(rows.len())
    };

    let mut controls = vec![hall.view(), day.view()];
    let detail = if hall.selection.is_all() || day.selection.is_all() || rows.is_empty() {
        None
    } else {
        let mut seen = HashSet::new();
        let units: Vec<String> = rows
            .iter()
            .filter(|s| seen.insert(s.unit_no))
            .map(|s| s.unit_no.to_string())
            .collect();
        let unit = Control::specific("unit", units, ctx.param("unit"));
        let detail = detail_rows(&records, &rows, unit.selection.label());
        controls.push(unit.view());
        Some(detail)
    };

    DayLastStatsPage {
        range: ctx.range_view(),
        controls,
        win_rate,
        notice: notice_if_empty(rows.len()),
        height,
        rows,
        detail,
    }
}

/// Plays of `unit` that make up the shown statistics
fn detail_rows(records: &[&ResultRecord], shown: &[DayLastStat], unit: &str) -> Vec<DetailRow> {
    let mut detail: Vec<DetailRow> = records
        .iter()
        .filter(|r| r.unit_no.to_string() == unit)
        .filter(|r| {
            shown.iter().any(|s| {
                s.hall == r.hall && s.model == r.model && s.unit_no == r.unit_no && s.day_last == r.day_last()
            })
        })
        .map(|r| DetailRow {
            hall: r.hall.clone(),
            model: r.model.clone(),
            unit_no: r.unit_no,
            date: r.date,
            game: r.game,
            medal: r.medal,
            medal_rate: r.payout_rate().map(|v| round_to(v, 3)),
            bb: r.bb,
            rb: r.rb,
            bb_rate: r.games_per_bb().map(|v| round_to(v, 1)),
            rb_rate: r.games_per_rb().map(|v| round_to(v, 1)),
            total_rate: r.games_per_bonus().map(|v| round_to(v, 1)),
        })
        .collect();
    detail.sort_by(|a, b| b.date.cmp(&a.date));
    detail
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext, cfg: &DashboardConfig) -> Result<DayLastStatsPage> {
    let history = fetch_records(fetcher, &ctx.range).await?;
    let active = fetch_records(fetcher, &active_range(ctx.today)).await?;
    Ok(build(&history, &active, ctx, cfg))
}
