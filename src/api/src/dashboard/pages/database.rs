//! Raw result browser: hall, model and unit cascade over a short window.

use anyhow::Result;
use serde::Serialize;

use super::{fetch_records, notice_if_empty};
use crate::dashboard::filters::{by_frequency, distinct, filter_by, with_all_inserted, Control};
use crate::dashboard::format::auto_height;
use crate::dashboard::{PageContext, ResultRecord};
use crate::storage::fetch::Fetcher;
use crate::types::{DateRangeView, Height, ResultRowView, SelectView};

pub const DAYS: u64 = 5;

#[derive(Debug, Serialize)]
pub struct DatabasePage {
    pub range: DateRangeView,
    pub controls: Vec<SelectView>,
    pub count: usize,
    pub rows: Vec<ResultRowView>,
    pub height: Height,
    pub notice: Option<String>,
}

pub fn build(records: &[ResultRecord], ctx: &PageContext) -> DatabasePage {
    let in_range: Vec<&ResultRecord> = records.iter().filter(|r| ctx.range.contains(r.date)).collect();

    let hall = Control::specific("hall", distinct(&in_range, |r| r.hall.clone()), ctx.param("hall"));
    let rows = filter_by(&in_range, &hall.selection, |r| r.hall.clone());

    let model = Control::new(
        "model",
        with_all_inserted(by_frequency(&rows, |r| r.model.clone())),
        ctx.param("model"),
    );
    let rows = filter_by(&rows, &model.selection, |r| r.model.clone());

    let unit = Control::new(
        "unit",
        with_all_inserted(distinct(&rows, |r| r.unit_no)),
        ctx.param("unit"),
    );
    let mut rows = filter_by(&rows, &unit.selection, |r| r.unit_no.to_string());
    rows.sort_by(|a, b| {
        a.model
            .cmp(&b.model)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.unit_no.cmp(&b.unit_no))
    });

    DatabasePage {
        range: ctx.range_view(),
        controls: vec![hall.view(), model.view(), unit.view()],
        count: rows.len(),
        height: auto_height(rows.len()),
        notice: notice_if_empty(rows.len()),
        rows: rows.iter().map(|r| r.to_view()).collect(),
    }
}

pub async fn render(fetcher: &Fetcher, ctx: &PageContext) -> Result<DatabasePage> {
    let records = fetch_records(fetcher, &ctx.range).await?;
    Ok(build(&records, ctx))
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
        vec![
            rec("B", "M1", 1, "2025-11-14", 100, 0),
            rec("A", "M2", 5, "2025-11-14", 100, 0),
            rec("A", "M1", 1, "2025-11-14", 100, 0),
            rec("A", "M1", 2, "2025-11-14", 100, 0),
            rec("A", "M1", 2, "2025-11-13", 100, 0),
        ]
    }

    #[test]
    fn test_defaults_to_first_hall() {
        let page = build(&sample(), &ctx(&[]));

        assert_eq!(page.controls[0].options, vec!["A", "B"]);
        assert_eq!(page.controls[0].selected, "A");
        // M1 appears three times in hall A
        assert_eq!(page.controls[1].options, vec!["M1", "M2", ALL]);
        assert_eq!(page.controls[1].selected, "M1");
        assert_eq!(page.controls[2].options, vec!["1", "2", ALL]);
        assert_eq!(page.controls[2].selected, "1");
        assert_eq!(page.count, 1);
    }

    #[test]
    fn test_all_units() {
        let page = build(&sample(), &ctx(&[("hall", "A"), ("model", "M1"), ("unit", ALL)]));
        assert_eq!(page.count, 3);
        assert_eq!(page.rows[0].date.to_string(), "2025-11-14");
    }

    #[test]
    fn test_unknown_hall_falls_back() {
        let page = build(&sample(), &ctx(&[("hall", "Z"), ("model", ALL), ("unit", ALL)]));
        assert_eq!(page.controls[0].selected, "A");
        assert_eq!(page.count, 4);
    }

    #[test]
    fn test_hall_named_all_is_a_hall() {
        let mut records = sample();
        records.push(rec(ALL, "M3", 9, "2025-11-14", 100, 0));

        let page = build(&records, &ctx(&[("hall", ALL), ("model", ALL), ("unit", ALL)]));
        assert_eq!(page.controls[0].selected, ALL);
        assert_eq!(page.count, 1);
        assert_eq!(page.rows[0].hall, ALL);
        assert_eq!(page.controls[1].options, vec!["M3", ALL]);
    }

    #[test]
    fn test_empty() {
        let page = build(&[], &ctx(&[]));
        assert!(page.notice.is_some());
        assert_eq!(page.controls[1].options, vec![ALL]);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn test_height_grows_with_rows() {
        let records: Vec<ResultRecord> = (1..=12).map(|u| rec("A", "M1", u, "2025-11-14", 100, 0)).collect();
        let page = build(&records, &ctx(&[("unit", ALL)]));
        assert_eq!(page.count, 12);
        assert_eq!(page.height, Height::Pixels(460));
    }
}
