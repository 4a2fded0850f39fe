//! Per-unit history over the last thirty days, with a day-last summary.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{fetch_records, hall_model_unit_key, notice_if_empty};
use crate::config::DashboardConfig;
use crate::dashboard::filters::{distinct, filter_by, with_all_last, Control, DayFilters};
use crate::dashboard::format::{auto_height, style_pivot};
use crate::dashboard::table::{date_label, payout_rate, pivot, ratio, round_to, Agg, Pivot, PivotSpec};
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, Height, Key, PivotView, SelectView};

pub const DAYS: u64 = 30;

const INDEX: [&str; 3] = ["hall", "model", "unit_no"];

/// Totals of one unit on days ending in one digit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLastCell {
    pub day_last: u32,
    pub game: i64,
    pub medal: i64,
    pub medal_rate: Option<f64>,
    pub rb_rate: Option<f64>,
    pub total_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLastRow {
    pub key: Vec<Key>,
    /// One cell per entry of [`DayLastTable::digits`], `None` without plays
    pub cells: Vec<Option<DayLastCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayLastTable {
    pub index: Vec<String>,
    pub digits: Vec<u32>,
    pub rows: Vec<DayLastRow>,
    pub height: Height,
}

#[derive(Debug, Serialize)]
pub struct UnitHistoryPage {
    pub range: DateRangeView,
    pub controls: Vec<SelectView>,
    pub count: usize,
    pub games: PivotView,
    pub medals: PivotView,
    pub rb_rate: PivotView,
    pub total_rate: PivotView,
    pub payout_rate: PivotView,
    pub day_last: DayLastTable,
    pub notice: Option<String>,
}

pub fn build(records: &[ResultRecord], ctx: &PageContext, cfg: &DashboardConfig) -> Result<UnitHistoryPage> {
    let in_range: Vec<&ResultRecord> = records.iter().filter(|r| ctx.range.contains(r.date)).collect();

    let hall = Control::new(
        "hall",
        with_all_last(distinct(&in_range, |r| r.hall.clone())),
        ctx.param("hall"),
    );
    let rows = filter_by(&in_range, &hall.selection, |r| r.hall.clone());

    let model = Control::new(
        "model",
        with_all_last(distinct(&rows, |r| r.model.clone())),
        ctx.param("model"),
    );
    let rows = filter_by(&rows, &model.selection, |r| r.model.clone());

    let unit = Control::new(
        "unit",
        with_all_last(distinct(&rows, |r| r.unit_no)),
        ctx.param("unit"),
    );
    let rows = filter_by(&rows, &unit.selection, |r| r.unit_no.to_string());

    let (days, rows) = DayFilters::resolve(&rows, &ctx.params);

    let column = |r: &&ResultRecord| r.date;
    let label = |d: &NaiveDate| date_label(*d);
    let index = |r: &&ResultRecord| hall_model_unit_key(r);
    let game = |r: &&ResultRecord| Some(r.game as f64);
    let medal = |r: &&ResultRecord| Some(r.medal as f64);
    let rb = |r: &&ResultRecord| Some(r.rb as f64);
    let bonus = |r: &&ResultRecord| Some((r.bb + r.rb) as f64);
    let mut spec = PivotSpec {
        index: &index,
        column: &column,
        label: &label,
        value: &game,
        agg: Agg::Sum,
        margins: false,
    };
    let games = pivot(&rows, &spec).reverse_columns();
    spec.value = &medal;
    let medals = pivot(&rows, &spec).reverse_columns();
    spec.value = &rb;
    let rbs = pivot(&rows, &spec).reverse_columns();
    spec.value = &bonus;
    let bonuses = pivot(&rows, &spec).reverse_columns();

    let rb_rate = games.zip_with(&rbs, ratio)?;
    let total_rate = games.zip_with(&bonuses, ratio)?;
    let payout = games.zip_with(&medals, payout_rate)?;

    let mut controls = vec![hall.view(), model.view(), unit.view()];
    controls.extend(days.views());

    Ok(UnitHistoryPage {
        range: ctx.range_view(),
        controls,
        count: rows.len(),
        games: style_pivot("games", &INDEX, &games, None, 0),
        medals: style_pivot("medals", &INDEX, &medals, None, 0),
        rb_rate: style_pivot("games per RB", &INDEX, &rb_rate, None, 1),
        total_rate: style_pivot("games per bonus", &INDEX, &total_rate, None, 1),
        payout_rate: styled_rate(&payout, cfg),
        day_last: day_last_table(&rows),
        notice: notice_if_empty(rows.len()),
    })
}

fn styled_rate(payout: &Pivot, cfg: &DashboardConfig) -> PivotView {
    style_pivot("payout rate", &INDEX, payout, Some(cfg.payout_highlight), 3)
}

#[derive(Default)]
struct Totals {
    game: i64,
    medal: i64,
    bb: i64,
    rb: i64,
}

/// Sum each unit's plays by the last digit of the day
pub fn day_last_table(rows: &[&ResultRecord]) -> DayLastTable {
    let digits: Vec<u32> = rows
        .iter()
        .map(|r| r.day_last())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut totals: BTreeMap<Vec<Key>, BTreeMap<u32, Totals>> = BTreeMap::new();
    for r in rows {
        let t = totals
            .entry(hall_model_unit_key(r))
            .or_default()
            .entry(r.day_last())
            .or_default();
        t.game += r.game;
        t.medal += r.medal;
        t.bb += r.bb;
        t.rb += r.rb;
    }

    let rows: Vec<DayLastRow> = totals
        .into_iter()
        .map(|(key, by_digit)| DayLastRow {
            key,
            cells: digits
                .iter()
                .map(|d| by_digit.get(d).map(|t| day_last_cell(*d, t)))
                .collect(),
        })
        .collect();

    DayLastTable {
        index: INDEX.iter().map(|s| s.to_string()).collect(),
        digits,
        height: auto_height(rows.len()),
        rows,
    }
}

fn day_last_cell(day_last: u32, t: &Totals) -> DayLastCell {
    let game = t.game as f64;
    DayLastCell {
        day_last,
        game: t.game,
        medal: t.medal,
        medal_rate: payout_rate(game, t.medal as f64).map(|v| round_to(v, 3)),
        rb_rate: ratio(game, t.rb as f64).map(|v| round_to(v, 1)),
        total_rate: ratio(game, (t.bb + t.rb) as f64).map(|v| round_to(v, 1)),
    }
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext, cfg: &DashboardConfig) -> Result<UnitHistoryPage> {
    let records = fetch_records(fetcher, &ctx.range).await?;
    build(&records, ctx, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::filters::ALL;
    use crate::dashboard::table::tests::rec;

    fn ctx(pairs: &[(&str, &str)]) -> PageContext {
        let params = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        PageContext::recent("2025-11-15".parse().unwrap(), DAYS, params).unwrap()
    }

    fn sample() -> Vec<ResultRecord> {
        let mut records = vec![
            rec("A", "M1", 1, "2025-11-11", 3000, 300),
            rec("A", "M1", 1, "2025-11-01", 6000, -600),
            rec("A", "M1", 2, "2025-11-02", 1500, 0),
            rec("A", "M2", 8, "2025-11-12", 900, 0),
            rec("B", "M1", 1, "2025-11-12", 900, 0),
        ];
        records[0].bb = 10;
        records[0].rb = 5;
        records[1].bb = 20;
        records[1].rb = 10;
        records
    }

    #[test]
    fn test_cascade_controls() {
        let page = build(&sample(), &ctx(&[]), &DashboardConfig::default()).unwrap();
        assert_eq!(page.controls[0].options, vec!["A", "B", ALL]);
        assert_eq!(page.controls[1].options, vec!["M1", "M2", ALL]);
        assert_eq!(page.controls[2].options, vec!["1", "2", ALL]);
        assert_eq!(page.controls[2].selected, "1");
        assert_eq!(page.count, 2);
    }

    #[test]
    fn test_rate_pivots() {
        let page = build(&sample(), &ctx(&[]), &DashboardConfig::default()).unwrap();

        assert_eq!(page.games.columns, vec!["11-11 Tue", "11-01 Sat"]);
        assert_eq!(page.games.rows.len(), 1);
        assert_eq!(page.games.rows[0].cells[0].value, Some(3000.0));
        assert_eq!(page.rb_rate.rows[0].cells[0].value, Some(600.0));
        assert_eq!(page.total_rate.rows[0].cells[0].value, Some(200.0));

        let rate = &page.payout_rate.rows[0].cells;
        assert_eq!(rate[0].value, Some(1.033));
        assert!(rate[0].highlight);
        assert_eq!(rate[1].value, Some(0.967));
        assert!(!rate[1].highlight);
    }

    #[test]
    fn test_day_last_table() {
        let page = build(&sample(), &ctx(&[]), &DashboardConfig::default()).unwrap();
        let table = &page.day_last;

        // the 1st and the 11th share digit 1
        assert_eq!(table.digits, vec![1]);
        assert_eq!(table.rows.len(), 1);
        let cell = table.rows[0].cells[0].as_ref().unwrap();
        assert_eq!(cell.game, 9000);
        assert_eq!(cell.medal, -300);
        assert_eq!(cell.medal_rate, Some(0.989));
        assert_eq!(cell.rb_rate, Some(600.0));
        assert_eq!(cell.total_rate, Some(200.0));
    }

    #[test]
    fn test_day_last_gaps() {
        let records = sample();
        let refs: Vec<&ResultRecord> = records.iter().filter(|r| r.hall == "A").collect();
        let table = day_last_table(&refs);

        assert_eq!(table.digits, vec![1, 2]);
        assert_eq!(table.rows.len(), 3);
        // unit 2 only played on the 2nd
        assert!(table.rows[1].cells[0].is_none());
        assert_eq!(table.rows[1].cells[1].as_ref().unwrap().game, 1500);
    }

    #[test]
    fn test_zero_bonus_rates_undefined() {
        let mut records = sample();
        records[0].rb = 0;
        records[0].bb = 0;
        let page = build(&records, &ctx(&[("day", "11")]), &DashboardConfig::default()).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.rb_rate.rows[0].cells[0].value, None);
    }
}
