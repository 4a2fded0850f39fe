//! Response types for the dashboard API.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Table display height: `"auto"` or pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Height {
    Auto,
    Pixels(u32),
}

impl Serialize for Height {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Height::Auto => serializer.serialize_str("auto"),
            Height::Pixels(px) => serializer.serialize_u32(*px),
        }
    }
}

/// Effective date range of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRangeView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Latest selectable date
    pub max: NaiveDate,
}

/// A selection control: its options and the resolved choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectView {
    pub name: String,
    pub options: Vec<String>,
    pub selected: String,
}

/// Row/column index value of a pivot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

/// One displayed pivot cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub value: Option<f64>,
    pub highlight: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRowView {
    pub key: Vec<Key>,
    pub cells: Vec<CellView>,
}

/// A pivot ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotView {
    pub title: String,
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<PivotRowView>,
    pub height: Height,
}

/// Flat result row as shown in list tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRowView {
    pub date: NaiveDate,
    pub pref: String,
    pub hall: String,
    pub model: String,
    pub unit_no: i64,
    pub game: i64,
    pub medal: i64,
    pub bb: i64,
    pub rb: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_serialization() {
        assert_eq!(serde_json::to_string(&Height::Auto).unwrap(), "\"auto\"");
        assert_eq!(serde_json::to_string(&Height::Pixels(400)).unwrap(), "400");
    }

    #[test]
    fn test_key_order_and_serialization() {
        assert!(Key::Int(9) < Key::Int(10));
        assert_eq!(serde_json::to_string(&Key::Int(9)).unwrap(), "9");
        assert_eq!(serde_json::to_string(&Key::from("A")).unwrap(), "\"A\"");
    }
}
