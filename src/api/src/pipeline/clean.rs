//! Cleaning of the raw results file.
//!
//! Renames the site's column labels to store column names, collapses model
//! aliases and coerces numeric text. Rows that cannot be coerced are set
//! aside with a reason instead of failing the run.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::scraper::normalize::strip_thousands;

/// Column label mapping, unknown labels pass through
const COLUMN_RENAMES: &[(&str, &str)] = &[
    ("pref", "pref"),
    ("prefecture", "pref"),
    ("h_name", "hall"),
    ("m_name", "model"),
    ("model_name", "model"),
    ("date", "date"),
    ("台番", "unit_no"),
    ("G数", "game"),
    ("BB", "bb"),
    ("RB", "rb"),
    ("差枚", "medal"),
];

/// Variant model labels and their canonical names
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("SミスタージャグラーKK", "ミスタージャグラー"),
    ("S ミスタージャグラー KK", "ミスタージャグラー"),
    ("SアイムジャグラーEX", "アイムジャグラーEX-TP"),
    ("ファンキージャグラー2KT", "ファンキージャグラー2"),
    ("ジャグラーガールズSS", "ジャグラーガールズ"),
    ("S ネオアイムジャグラーEX KK", "ネオアイムジャグラーEX"),
];

const REQUIRED: [&str; 9] = [
    "pref", "hall", "model", "date", "unit_no", "game", "bb", "rb", "medal",
];

/// One cleaned result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub pref: String,
    pub hall: String,
    pub model: String,
    pub date: NaiveDate,
    pub unit_no: i64,
    pub game: i64,
    pub bb: i64,
    pub rb: i64,
    pub medal: i64,
}

/// A row set aside during cleaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 1-based line in the input file, header included
    pub line: u64,
    pub reason: String,
    pub raw: String,
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub rows: Vec<CleanRecord>,
    pub rejected: Vec<RejectedRow>,
}

/// Store column name for a raw column label
pub fn rename_column(label: &str) -> String {
    let label = label.trim();
    COLUMN_RENAMES
        .iter()
        .find(|(from, _)| *from == label)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| label.to_string())
}

/// Canonical model name, collapsing known aliases
pub fn canonical_model(name: &str) -> String {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Parse integer text that may carry thousands separators or a sign
pub fn parse_count(text: &str) -> Option<i64> {
    strip_thousands(text).parse().ok()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
}

/// Clean raw CSV content
///
/// Fails only when a required column is absent from the header.
pub fn clean_reader<R: Read>(input: R) -> Result<CleanReport> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(rename_column)
        .collect();

    let mut index = HashMap::new();
    for (i, name) in headers.iter().enumerate() {
        index.entry(name.as_str()).or_insert(i);
    }
    for column in REQUIRED {
        if !index.contains_key(column) {
            anyhow::bail!("Missing column: {}", column);
        }
    }

    let mut report = CleanReport::default();
    for (i, record) in reader.records().enumerate() {
        let line = i as u64 + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                report.rejected.push(RejectedRow {
                    line,
                    reason: format!("unreadable row: {}", e),
                    raw: String::new(),
                });
                continue;
            }
        };

        match clean_record(&record, &index) {
            Ok(row) => report.rows.push(row),
            Err(reason) => report.rejected.push(RejectedRow {
                line,
                reason,
                raw: record.iter().collect::<Vec<_>>().join(","),
            }),
        }
    }

    Ok(report)
}

fn field<'a>(
    record: &'a csv::StringRecord,
    index: &HashMap<&str, usize>,
    name: &str,
) -> std::result::Result<&'a str, String> {
    index
        .get(name)
        .and_then(|&i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing {}", name))
}

fn count(
    record: &csv::StringRecord,
    index: &HashMap<&str, usize>,
    name: &str,
) -> std::result::Result<i64, String> {
    let raw = field(record, index, name)?;
    parse_count(raw).ok_or_else(|| format!("non-numeric {}: {:?}", name, raw))
}

fn clean_record(
    record: &csv::StringRecord,
    index: &HashMap<&str, usize>,
) -> std::result::Result<CleanRecord, String> {
    let date_text = field(record, index, "date")?;
    let date = parse_date(date_text).ok_or_else(|| format!("invalid date: {:?}", date_text))?;

    Ok(CleanRecord {
        pref: field(record, index, "pref")?.to_string(),
        hall: field(record, index, "hall")?.to_string(),
        model: canonical_model(field(record, index, "model")?),
        date,
        unit_no: count(record, index, "unit_no")?,
        game: count(record, index, "game")?,
        bb: count(record, index, "bb")?,
        rb: count(record, index, "rb")?,
        medal: count(record, index, "medal")?,
    })
}

/// Clean `input`, writing the cleaned rows and the rejected rows
pub fn clean_file(input: &Path, output: &Path, rejected_path: &Path) -> Result<CleanReport> {
    info!("Cleaning {}", input.display());
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let report = clean_reader(file)?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    for row in &report.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let mut writer = csv::Writer::from_path(rejected_path)
        .with_context(|| format!("Failed to create {}", rejected_path.display()))?;
    for row in &report.rejected {
        writer.serialize(row)?;
    }
    writer.flush()?;

    if !report.rejected.is_empty() {
        warn!(
            "{} rows rejected, see {}",
            report.rejected.len(),
            rejected_path.display()
        );
    }
    info!("Cleaned {} rows -> {}", report.rows.len(), output.display());

    Ok(report)
}

/// Read a cleaned results file, dropping rows that fail to parse
pub fn read_cleaned(path: &Path) -> Result<Vec<CleanRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<CleanRecord>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Dropping line {}: {}", i + 2, e),
        }
    }
    Ok(rows)
}
