//! Selection controls and row filters shared by the pages.
//!
//! Every control offers options derived from the rows left by the controls
//! before it. A request naming a value that is not on offer falls back to
//! the first option.
//!
//! `ALL` is reserved for the no-filter option. The `with_all_*` helpers fold
//! a data value spelled `ALL` into that option; lists without an ALL option
//! resolve through [`Control::specific`] so such a value stays selectable.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::table::ResultRecord;
use crate::types::SelectView;

/// Option meaning "no filter"
pub const ALL: &str = "ALL";
/// Position at which the ALL option is inserted into long lists
pub const ALL_POSITION: usize = 6;
/// Weekday options in display order
pub const WEEKDAY_OPTIONS: [&str; 7] = ["土", "日", "月", "火", "水", "木", "金"];

/// Resolved choice of a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Value(String),
}

impl Selection {
    pub fn parse(s: &str) -> Self {
        if s == ALL {
            Selection::All
        } else {
            Selection::Value(s.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Value(v) => v == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn label(&self) -> &str {
        match self {
            Selection::All => ALL,
            Selection::Value(v) => v,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Value(v) => Some(v),
        }
    }
}

/// A resolved control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub name: String,
    pub options: Vec<String>,
    pub selection: Selection,
}

impl Control {
    /// Resolve `requested` against options that may carry the ALL option
    pub fn new(name: &str, options: Vec<String>, requested: Option<&str>) -> Self {
        let selection = match requested {
            Some(r) if options.iter().any(|o| o == r) => Selection::parse(r),
            _ => options
                .first()
                .map(|o| Selection::parse(o))
                .unwrap_or(Selection::All),
        };
        Self {
            name: name.to_string(),
            options,
            selection,
        }
    }

    /// Resolve `requested` against data values only; `ALL` here is a value
    pub fn specific(name: &str, options: Vec<String>, requested: Option<&str>) -> Self {
        let selection = match requested {
            Some(r) if options.iter().any(|o| o == r) => Selection::Value(r.to_string()),
            _ => options
                .first()
                .map(|o| Selection::Value(o.clone()))
                .unwrap_or(Selection::All),
        };
        Self {
            name: name.to_string(),
            options,
            selection,
        }
    }

    pub fn view(&self) -> SelectView {
        SelectView {
            name: self.name.clone(),
            options: self.options.clone(),
            selected: self.selection.label().to_string(),
        }
    }
}

/// Drop data values that would read as the ALL option
fn without_reserved(mut options: Vec<String>) -> Vec<String> {
    let before = options.len();
    options.retain(|o| o != ALL);
    if options.len() < before {
        warn!("Value {:?} folded into the ALL option", ALL);
    }
    options
}

/// Insert ALL at [`ALL_POSITION`], or append it to short lists
pub fn with_all_inserted(options: Vec<String>) -> Vec<String> {
    let mut options = without_reserved(options);
    if options.len() > ALL_POSITION {
        options.insert(ALL_POSITION, ALL.to_string());
    } else {
        options.push(ALL.to_string());
    }
    options
}

pub fn with_all_first(options: Vec<String>) -> Vec<String> {
    std::iter::once(ALL.to_string()).chain(without_reserved(options)).collect()
}

pub fn with_all_last(options: Vec<String>) -> Vec<String> {
    let mut options = without_reserved(options);
    options.push(ALL.to_string());
    options
}

/// Distinct values in ascending order
pub fn distinct<T: Ord + ToString>(records: &[&ResultRecord], f: impl Fn(&ResultRecord) -> T) -> Vec<String> {
    records
        .iter()
        .map(|r| f(r))
        .collect::<BTreeSet<T>>()
        .into_iter()
        .map(|v| v.to_string())
        .collect()
}

/// Distinct values, most frequent first, ties by first appearance
pub fn by_frequency(records: &[&ResultRecord], f: impl Fn(&ResultRecord) -> String) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        let entry = counts.entry(f(r)).or_insert((0, i));
        entry.0 += 1;
    }
    let mut values: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    values.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    values.into_iter().map(|(v, _)| v).collect()
}

/// Records matching `selection` on the field picked by `f`
pub fn filter_by<'a>(
    records: &[&'a ResultRecord],
    selection: &Selection,
    f: impl Fn(&ResultRecord) -> String,
) -> Vec<&'a ResultRecord> {
    records
        .iter()
        .copied()
        .filter(|r| selection.matches(&f(r)))
        .collect()
}

/// Day-of-month controls: day-last digit, day and weekday
#[derive(Debug, Clone)]
pub struct DayFilters {
    pub day_last: Control,
    pub day: Control,
    pub weekday: Control,
}

impl DayFilters {
    /// Resolve the three controls in cascade, each defaulting to ALL
    pub fn resolve<'a>(
        records: &[&'a ResultRecord],
        params: &HashMap<String, String>,
    ) -> (Self, Vec<&'a ResultRecord>) {
        let day_last = Control::new(
            "day_last",
            with_all_first(distinct(records, |r| r.day_last())),
            Some(param_or_all(params, "day_last")),
        );
        let records = filter_by(records, &day_last.selection, |r| r.day_last().to_string());

        let day = Control::new(
            "day",
            with_all_first(distinct(&records, |r| r.day())),
            Some(param_or_all(params, "day")),
        );
        let records = filter_by(&records, &day.selection, |r| r.day().to_string());

        let weekday = Control::new(
            "weekday",
            with_all_first(WEEKDAY_OPTIONS.iter().map(|s| s.to_string()).collect()),
            Some(param_or_all(params, "weekday")),
        );
        let records = filter_by(&records, &weekday.selection, |r| r.weekday().to_string());

        (
            Self {
                day_last,
                day,
                weekday,
            },
            records,
        )
    }

    pub fn views(&self) -> Vec<SelectView> {
        vec![self.day_last.view(), self.day.view(), self.weekday.view()]
    }
}

fn param_or_all<'p>(params: &'p HashMap<String, String>, key: &str) -> &'p str {
    params.get(key).map(String::as_str).unwrap_or(ALL)
}
