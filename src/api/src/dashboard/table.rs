//! Typed result table with grouping and pivoting.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::storage::Row;
use crate::types::{Key, ResultRowView};

/// Label of the margin row and column
pub const SUBTOTAL: &str = "SubTotal";

const WEEKDAYS: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];

/// One row of the joined results view
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub pref: String,
    pub hall: String,
    pub model: String,
    pub unit_no: i64,
    pub game: i64,
    pub bb: i64,
    pub rb: i64,
    pub medal: i64,
}

impl ResultRecord {
    /// Decode view rows, skipping rows that do not fit
    pub fn from_rows(rows: Vec<Row>) -> Vec<Self> {
        rows.into_iter()
            .filter_map(|row| {
                match serde_json::from_value::<Self>(serde_json::Value::Object(row)) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!("Skipping malformed result row: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    /// Last digit of the day of month
    pub fn day_last(&self) -> u32 {
        self.date.day() % 10
    }

    pub fn weekday(&self) -> &'static str {
        WEEKDAYS[self.date.weekday().num_days_from_monday() as usize]
    }

    /// Column label used by date pivots
    pub fn date_label(&self) -> String {
        date_label(self.date)
    }

    /// Medals out over medals in, three medals per game
    pub fn payout_rate(&self) -> Option<f64> {
        payout_rate(self.game as f64, self.medal as f64)
    }

    pub fn games_per_bb(&self) -> Option<f64> {
        ratio(self.game as f64, self.bb as f64)
    }

    pub fn games_per_rb(&self) -> Option<f64> {
        ratio(self.game as f64, self.rb as f64)
    }

    pub fn games_per_bonus(&self) -> Option<f64> {
        ratio(self.game as f64, (self.bb + self.rb) as f64)
    }

    pub fn to_view(&self) -> ResultRowView {
        ResultRowView {
            date: self.date,
            pref: self.pref.clone(),
            hall: self.hall.clone(),
            model: self.model.clone(),
            unit_no: self.unit_no,
            game: self.game,
            medal: self.medal,
            bb: self.bb,
            rb: self.rb,
        }
    }
}

/// `MM-DD Wkd` column label
pub fn date_label(date: NaiveDate) -> String {
    date.format("%m-%d %a").to_string()
}

/// `(game*3 + medal) / (game*3)`, undefined for zero games
pub fn payout_rate(game: f64, medal: f64) -> Option<f64> {
    let medals_in = game * 3.0;
    if medals_in == 0.0 || !medals_in.is_finite() {
        return None;
    }
    Some((medals_in + medal) / medals_in)
}

/// `a / b`, undefined for a zero divisor
pub fn ratio(a: f64, b: f64) -> Option<f64> {
    if b == 0.0 {
        None
    } else {
        Some(a / b)
    }
}

pub fn round_to(x: f64, digits: i32) -> f64 {
    let p = 10f64.powi(digits);
    (x * p).round() / p
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation, undefined below two values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Group items by key, keys in ascending order
pub fn group_by<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> BTreeMap<K, Vec<&T>> {
    let mut groups: BTreeMap<K, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(item)).or_default().push(item);
    }
    groups
}

/// Cell aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Mean,
    Sum,
}

impl Agg {
    fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Agg::Mean => mean(values),
            Agg::Sum if values.is_empty() => None,
            Agg::Sum => Some(values.iter().sum()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub key: Vec<Key>,
    pub cells: Vec<Option<f64>>,
    /// Row margin when margins are on
    pub total: Option<f64>,
}

/// Index rows by column values, one aggregated cell per pair
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
    /// Column margins, present when margins are on
    pub totals: Option<PivotRow>,
}

/// How to pivot a slice of items
pub struct PivotSpec<'a, T, C> {
    pub index: &'a dyn Fn(&T) -> Vec<Key>,
    pub column: &'a dyn Fn(&T) -> C,
    pub label: &'a dyn Fn(&C) -> String,
    pub value: &'a dyn Fn(&T) -> Option<f64>,
    pub agg: Agg,
    pub margins: bool,
}

/// Build a pivot; rows and columns are sorted by their keys
///
/// A row or column exists when any item carries its key, so pivots built
/// over the same items with different values share one shape.
pub fn pivot<T, C: Ord + Clone>(items: &[T], spec: &PivotSpec<'_, T, C>) -> Pivot {
    let columns: BTreeSet<C> = items.iter().map(|i| (spec.column)(i)).collect();
    let columns: Vec<C> = columns.into_iter().collect();
    let position: BTreeMap<&C, usize> = columns.iter().enumerate().map(|(i, c)| (c, i)).collect();

    let groups = group_by(items, |i| (spec.index)(i));
    let mut column_values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    let mut all_values = Vec::new();

    let mut rows = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut cell_values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
        let mut row_values = Vec::new();
        for item in members {
            let Some(v) = (spec.value)(item).filter(|v| v.is_finite()) else {
                continue;
            };
            let col = position[&(spec.column)(item)];
            cell_values[col].push(v);
            column_values[col].push(v);
            row_values.push(v);
            all_values.push(v);
        }
        rows.push(PivotRow {
            key,
            cells: cell_values.iter().map(|vs| spec.agg.apply(vs)).collect(),
            total: if spec.margins { spec.agg.apply(&row_values) } else { None },
        });
    }

    let totals = spec.margins.then(|| {
        let width = rows.first().map(|r| r.key.len()).unwrap_or(1).max(1);
        let mut key = vec![Key::from(SUBTOTAL)];
        key.resize(width, Key::from(""));
        PivotRow {
            key,
            cells: column_values.iter().map(|vs| spec.agg.apply(vs)).collect(),
            total: spec.agg.apply(&all_values),
        }
    });

    Pivot {
        columns: columns.iter().map(|c| (spec.label)(c)).collect(),
        rows,
        totals,
    }
}

impl Pivot {
    /// Reverse column order, margins stay last
    pub fn reverse_columns(mut self) -> Self {
        self.columns.reverse();
        for row in self.rows.iter_mut().chain(self.totals.iter_mut()) {
            row.cells.reverse();
        }
        self
    }

    /// Combine two same-shape pivots cell by cell
    pub fn zip_with(
        &self,
        other: &Pivot,
        f: impl Fn(f64, f64) -> Option<f64>,
    ) -> anyhow::Result<Pivot> {
        if self.columns != other.columns || self.rows.len() != other.rows.len() {
            anyhow::bail!("Pivot shapes differ");
        }
        let cell = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => f(a, b),
            _ => None,
        };
        let zip_row = |a: &PivotRow, b: &PivotRow| PivotRow {
            key: a.key.clone(),
            cells: a.cells.iter().zip(&b.cells).map(|(x, y)| cell(*x, *y)).collect(),
            total: cell(a.total, b.total),
        };

        let rows = self
            .rows
            .iter()
            .zip(&other.rows)
            .map(|(a, b)| zip_row(a, b))
            .collect();
        let totals = match (&self.totals, &other.totals) {
            (Some(a), Some(b)) => Some(zip_row(a, b)),
            _ => None,
        };

        Ok(Pivot {
            columns: self.columns.clone(),
            rows,
            totals,
        })
    }

    /// Every value including margins
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.rows
            .iter()
            .chain(self.totals.iter())
            .flat_map(|r| r.cells.iter().chain(std::iter::once(&r.total)))
            .filter_map(|v| *v)
    }

    /// Number of rows including the margin row
    pub fn height(&self) -> usize {
        self.rows.len() + usize::from(self.totals.is_some())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rec(hall: &str, model: &str, unit_no: i64, date: &str, game: i64, medal: i64) -> ResultRecord {
        ResultRecord {
            date: date.parse().unwrap(),
            pref: "東京都".to_string(),
            hall: hall.to_string(),
            model: model.to_string(),
            unit_no,
            game,
            bb: game / 300,
            rb: game / 300,
            medal,
        }
    }

    #[test]
    fn test_rate_arithmetic() {
        let mut r = rec("A", "M", 1, "2025-11-14", 9000, 0);
        r.bb = 30;
        r.rb = 30;
        assert_eq!(r.payout_rate(), Some(1.0));
        assert_eq!(r.games_per_bb(), Some(300.0));
        assert_eq!(r.games_per_rb(), Some(300.0));
        assert_eq!(r.games_per_bonus(), Some(150.0));

        r.medal = 2700;
        assert_eq!(r.payout_rate(), Some(1.1));
    }

    #[test]
    fn test_zero_games_and_bonuses() {
        let mut r = rec("A", "M", 1, "2025-11-14", 0, 0);
        r.bb = 0;
        r.rb = 0;
        assert_eq!(r.payout_rate(), None);
        assert_eq!(r.games_per_bb(), None);
        assert_eq!(r.games_per_bonus(), None);
    }

    #[test]
    fn test_calendar_fields() {
        let r = rec("A", "M", 1, "2025-11-23", 1, 0);
        assert_eq!(r.day(), 23);
        assert_eq!(r.day_last(), 3);
        assert_eq!(r.weekday(), "日");
        assert_eq!(r.date_label(), "11-23 Sun");
        assert_eq!(rec("A", "M", 1, "2025-11-10", 1, 0).day_last(), 0);
    }

    #[test]
    fn test_stats() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(std_dev(&[5.0]), None);
        assert_eq!(std_dev(&[2.0, 4.0]), Some(2f64.sqrt()));
        assert_eq!(round_to(1.23456, 3), 1.235);
    }

    #[test]
    fn test_from_rows_skips_malformed() {
        let rows = vec![
            serde_json::json!({"date": "2025-11-14", "pref": "東京都", "hall": "A", "model": "M",
                "unit_no": 1, "game": 100, "bb": 1, "rb": 0, "medal": -50}),
            serde_json::json!({"date": "bad", "hall": "A", "model": "M",
                "unit_no": 1, "game": 100, "bb": 1, "rb": 0, "medal": -50}),
        ];
        let rows = rows.into_iter().map(|v| v.as_object().cloned().unwrap()).collect();
        let records = ResultRecord::from_rows(rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].medal, -50);
    }

    fn sample() -> Vec<ResultRecord> {
        vec![
            rec("A", "M1", 1, "2025-11-13", 1000, 100),
            rec("A", "M1", 2, "2025-11-13", 3000, -300),
            rec("A", "M1", 1, "2025-11-14", 2000, 0),
            rec("B", "M2", 9, "2025-11-14", 6000, 600),
        ]
    }

    fn hall_model(r: &ResultRecord) -> Vec<Key> {
        vec![Key::from(r.hall.as_str()), Key::from(r.model.as_str())]
    }

    #[test]
    fn test_group_by() {
        let records = sample();
        let groups = group_by(&records, |r| r.hall.clone());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["A"].len(), 3);
    }

    #[test]
    fn test_pivot_mean_with_margins() {
        let records = sample();
        let p = pivot(
            &records,
            &PivotSpec {
                index: &hall_model,
                column: &|r: &ResultRecord| r.date,
                label: &|d: &NaiveDate| date_label(*d),
                value: &|r: &ResultRecord| Some(r.game as f64),
                agg: Agg::Mean,
                margins: true,
            },
        );

        assert_eq!(p.columns, vec!["11-13 Thu", "11-14 Fri"]);
        assert_eq!(p.rows.len(), 2);
        assert_eq!(p.rows[0].cells, vec![Some(2000.0), Some(2000.0)]);
        assert_eq!(p.rows[0].total, Some(2000.0));
        assert_eq!(p.rows[1].cells, vec![None, Some(6000.0)]);

        let totals = p.totals.as_ref().unwrap();
        assert_eq!(totals.key, vec![Key::from(SUBTOTAL), Key::from("")]);
        assert_eq!(totals.cells, vec![Some(2000.0), Some(4000.0)]);
        assert_eq!(totals.total, Some(3000.0));
        assert_eq!(p.height(), 3);
    }

    #[test]
    fn test_pivot_sum_reverse_and_zip() {
        let records = sample();
        let column = |r: &ResultRecord| r.date;
        let label = |d: &NaiveDate| date_label(*d);
        let game = |r: &ResultRecord| Some(r.game as f64);
        let medal = |r: &ResultRecord| Some(r.medal as f64);
        let mut spec = PivotSpec {
            index: &hall_model,
            column: &column,
            label: &label,
            value: &game,
            agg: Agg::Sum,
            margins: false,
        };
        let games = pivot(&records, &spec).reverse_columns();
        spec.value = &medal;
        let medals = pivot(&records, &spec).reverse_columns();

        assert_eq!(games.columns[0], "11-14 Fri");
        assert_eq!(games.rows[0].cells, vec![Some(2000.0), Some(4000.0)]);
        assert!(games.totals.is_none());

        let rate = games.zip_with(&medals, payout_rate).unwrap();
        assert_eq!(rate.rows[0].cells[0], Some(1.0));
        assert_eq!(rate.rows[0].cells[1], Some((12000.0 - 200.0) / 12000.0));
        assert_eq!(rate.rows[1].cells[1], None);
    }

    #[test]
    fn test_zip_shape_mismatch() {
        let a = Pivot { columns: vec!["x".into()], rows: vec![], totals: None };
        let b = Pivot { columns: vec!["y".into()], rows: vec![], totals: None };
        assert!(a.zip_with(&b, |x, y| Some(x + y)).is_err());
    }

    #[test]
    fn test_empty_pivot() {
        let records: Vec<ResultRecord> = Vec::new();
        let p = pivot(
            &records,
            &PivotSpec {
                index: &hall_model,
                column: &|r: &ResultRecord| r.date,
                label: &|d: &NaiveDate| date_label(*d),
                value: &|r: &ResultRecord| Some(r.game as f64),
                agg: Agg::Mean,
                margins: true,
            },
        );
        assert!(p.rows.is_empty());
        assert!(p.columns.is_empty());
        assert_eq!(p.totals.unwrap().total, None);
    }
}
