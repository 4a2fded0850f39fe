//! Per-request page context.
//!
//! Built from the query string of each request and passed explicitly to
//! the page builders; no state survives between requests.

use anyhow::{Context, Result};
use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::HashMap;

use crate::types::DateRangeView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `today - days` through yesterday
    pub fn default_for(today: NaiveDate, days: u64) -> Self {
        Self {
            start: today - Days::new(days),
            end: today - Days::new(1),
        }
    }

    /// First day `months` months back through the end of last month
    pub fn previous_months(today: NaiveDate, months: u32) -> Self {
        let this_month_first = today.with_day(1).unwrap_or(today);
        Self {
            start: this_month_first - Months::new(months),
            end: this_month_first - Days::new(1),
        }
    }

    /// Clamp to `max`, then pull `start` back to `end` when inverted
    pub fn validated(self, max: NaiveDate) -> Self {
        let end = self.end.min(max);
        let start = self.start.min(max).min(end);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Everything a page needs to know about the request
#[derive(Debug, Clone)]
pub struct PageContext {
    pub today: NaiveDate,
    pub range: DateRange,
    /// Latest selectable date
    pub max: NaiveDate,
    pub params: HashMap<String, String>,
}

impl PageContext {
    /// Resolve the date range from `start`/`end` parameters
    ///
    /// Missing dates take `defaults`; malformed dates are an error.
    pub fn new(
        today: NaiveDate,
        defaults: DateRange,
        max: NaiveDate,
        params: HashMap<String, String>,
    ) -> Result<Self> {
        let start = parse_param(&params, "start")?.unwrap_or(defaults.start);
        let end = parse_param(&params, "end")?.unwrap_or(defaults.end);
        let range = DateRange { start, end }.validated(max);
        Ok(Self {
            today,
            range,
            max,
            params,
        })
    }

    /// Context for a page showing the last `days` days
    pub fn recent(today: NaiveDate, days: u64, params: HashMap<String, String>) -> Result<Self> {
        let defaults = DateRange::default_for(today, days);
        Self::new(today, defaults, defaults.end, params)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn range_view(&self) -> DateRangeView {
        DateRangeView {
            start: self.range.start,
            end: self.range.end,
            max: self.max,
        }
    }
}

fn parse_param(params: &HashMap<String, String>, key: &str) -> Result<Option<NaiveDate>> {
    match params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(s) => Ok(Some(
            s.parse()
                .with_context(|| format!("Invalid {} date: {:?}", key, s))?,
        )),
        None => Ok(None),
    }
}
