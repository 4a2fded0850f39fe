//! Display helpers: table height and threshold highlighting.

use super::table::{round_to, Pivot, PivotRow};
use crate::types::{CellView, Height, PivotRowView, PivotView};

const ROW_HEIGHT: u32 = 30;
const BASE_HEIGHT: u32 = 100;
const MAX_HEIGHT: u32 = 800;
/// Tables up to this many rows size themselves
const AUTO_ROWS: usize = 10;

/// Display height for a table of `rows` rows
pub fn auto_height(rows: usize) -> Height {
    if rows <= AUTO_ROWS {
        return Height::Auto;
    }
    let px = BASE_HEIGHT.saturating_add((rows as u32).saturating_mul(ROW_HEIGHT));
    Height::Pixels(px.min(MAX_HEIGHT))
}

/// Whether a value reaches the highlight threshold
pub fn highlight(value: Option<f64>, threshold: f64) -> bool {
    matches!(value, Some(v) if v >= threshold)
}

/// Round and flag a pivot for display
pub fn style_pivot(
    title: &str,
    index: &[&str],
    pivot: &Pivot,
    threshold: Option<f64>,
    decimals: i32,
) -> PivotView {
    let style_row = |row: &PivotRow| {
        let mut cells: Vec<CellView> = row
            .cells
            .iter()
            .map(|v| style_cell(*v, threshold, decimals))
            .collect();
        if pivot.totals.is_some() {
            cells.push(style_cell(row.total, threshold, decimals));
        }
        PivotRowView {
            key: row.key.clone(),
            cells,
        }
    };

    let mut columns = pivot.columns.clone();
    if pivot.totals.is_some() {
        columns.push(super::table::SUBTOTAL.to_string());
    }

    PivotView {
        title: title.to_string(),
        index: index.iter().map(|s| s.to_string()).collect(),
        columns,
        rows: pivot.rows.iter().chain(pivot.totals.iter()).map(style_row).collect(),
        height: auto_height(pivot.height()),
    }
}

fn style_cell(value: Option<f64>, threshold: Option<f64>, decimals: i32) -> CellView {
    CellView {
        value: value.map(|v| round_to(v, decimals)),
        highlight: threshold.map(|t| highlight(value, t)).unwrap_or(false),
    }
}
