//! Loads cleaned results into the store.
//!
//! Reference rows go in first (models, prefectures, halls), their ids are
//! read back, then the result rows are resolved and upserted in batches.

use anyhow::Result;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{error, info, warn};

use super::fetch::fetch_all_rows;
use super::query::Select;
use super::{OnConflict, Row, Store, HALLS, MODELS, PREFECTURES, RESULTS};
use crate::pipeline::CleanRecord;

/// Conflict key of the results table
pub const RESULT_KEY: [&str; 4] = ["hall_id", "model_id", "unit_no", "date"];

/// Outcome of a load
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub models: usize,
    pub prefectures: usize,
    pub halls: usize,
    /// Result rows sent in successful batches
    pub results: usize,
    /// Rows dropped for an unresolvable reference
    pub skipped: usize,
    /// Rows superseded by a later row with the same key
    pub duplicates: usize,
    pub failed_batches: usize,
}

/// Name to id maps read back from the reference tables
#[derive(Debug, Default)]
pub struct IdMaps {
    pub prefectures: HashMap<String, i64>,
    /// (prefecture_id, hall name) to hall_id
    pub halls: HashMap<(i64, String), i64>,
    pub models: HashMap<String, i64>,
}

/// Load `records` into `store`
pub async fn load(
    store: &dyn Store,
    records: &[CleanRecord],
    batch_size: usize,
    page_size: usize,
) -> Result<LoadReport> {
    if batch_size == 0 {
        anyhow::bail!("batch_size must be positive");
    }
    let mut report = LoadReport::default();

    // 1. models
    let models: BTreeSet<&str> = records.iter().map(|r| r.model.as_str()).collect();
    if models.is_empty() {
        warn!("No models to load");
    } else {
        let rows: Vec<Row> = models.iter().map(|m| named_row(m)).collect();
        store.upsert(MODELS, &rows, &["name"], OnConflict::Ignore).await?;
        report.models = rows.len();
        info!("models upsert: {}", rows.len());
    }

    // 2. prefectures
    let prefs: BTreeSet<&str> = records.iter().map(|r| r.pref.as_str()).collect();
    if prefs.is_empty() {
        warn!("No prefectures to load");
    } else {
        let rows: Vec<Row> = prefs.iter().map(|p| named_row(p)).collect();
        store.upsert(PREFECTURES, &rows, &["name"], OnConflict::Ignore).await?;
        report.prefectures = rows.len();
        info!("prefectures upsert: {}", rows.len());
    }

    // 3. halls, keyed by the prefecture ids just written
    let pref_ids = read_name_ids(store, PREFECTURES, "prefecture_id", page_size).await?;
    let pairs: BTreeSet<(&str, &str)> = records
        .iter()
        .map(|r| (r.pref.as_str(), r.hall.as_str()))
        .collect();
    let mut hall_rows = Vec::new();
    for (pref, hall) in pairs {
        let Some(&pid) = pref_ids.get(pref) else {
            warn!("prefecture_id not found: {}", pref);
            continue;
        };
        hall_rows.push(row_from(json!({"name": hall, "prefecture_id": pid})));
    }
    if hall_rows.is_empty() {
        warn!("No halls to load");
    } else {
        store
            .upsert(HALLS, &hall_rows, &["name", "prefecture_id"], OnConflict::Ignore)
            .await?;
        report.halls = hall_rows.len();
        info!("halls upsert: {}", hall_rows.len());
    }

    // 4. fresh id maps
    let ids = read_id_maps(store, page_size).await?;

    // 5. resolve
    let (rows, skipped) = resolve_results(records, &ids);
    report.skipped = skipped;
    let (rows, duplicates) = dedupe_results(rows);
    report.duplicates = duplicates;
    if duplicates > 0 {
        warn!("{} duplicate result rows superseded", duplicates);
    }
    if rows.is_empty() {
        warn!("No result rows to load");
        return Ok(report);
    }

    // 6. batched upsert
    for (i, batch) in rows.chunks(batch_size).enumerate() {
        match store.upsert(RESULTS, batch, &RESULT_KEY, OnConflict::Merge).await {
            Ok(()) => report.results += batch.len(),
            Err(e) => {
                error!("results batch {} ({} rows) failed: {:#}", i, batch.len(), e);
                report.failed_batches += 1;
            }
        }
    }

    info!(
        "results upsert: {} rows ({} skipped, {} failed batches)",
        report.results, report.skipped, report.failed_batches
    );
    Ok(report)
}

/// Map records to result rows, dropping those with an unknown reference
pub fn resolve_results(records: &[CleanRecord], ids: &IdMaps) -> (Vec<Row>, usize) {
    let mut rows = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for r in records {
        let Some(&pid) = ids.prefectures.get(&r.pref) else {
            warn!("prefecture_id not found: {}", r.pref);
            skipped += 1;
            continue;
        };
        let Some(&hall_id) = ids.halls.get(&(pid, r.hall.clone())) else {
            warn!("hall_id not found: {} / {}", r.pref, r.hall);
            skipped += 1;
            continue;
        };
        let Some(&model_id) = ids.models.get(&r.model) else {
            warn!("model_id not found: {}", r.model);
            skipped += 1;
            continue;
        };

        rows.push(row_from(json!({
            "hall_id": hall_id,
            "model_id": model_id,
            "unit_no": r.unit_no,
            "date": r.date.to_string(),
            "game": r.game,
            "bb": r.bb,
            "rb": r.rb,
            "medal": r.medal,
        })));
    }

    (rows, skipped)
}

/// Keep the last row per results key, in order of first appearance
///
/// Postgres refuses an upsert batch that touches one key twice.
pub fn dedupe_results(rows: Vec<Row>) -> (Vec<Row>, usize) {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
    let mut duplicates = 0;

    for row in rows {
        let key = RESULT_KEY
            .iter()
            .map(|c| row.get(*c).map(Value::to_string).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|");
        match position.get(&key) {
            Some(&i) => {
                unique[i] = row;
                duplicates += 1;
            }
            None => {
                position.insert(key, unique.len());
                unique.push(row);
            }
        }
    }

    (unique, duplicates)
}

/// Read all three reference tables into id maps
pub async fn read_id_maps(store: &dyn Store, page_size: usize) -> Result<IdMaps> {
    let prefectures = read_name_ids(store, PREFECTURES, "prefecture_id", page_size).await?;
    let models = read_name_ids(store, MODELS, "model_id", page_size).await?;

    let query = Select::from(HALLS)
        .columns(&["hall_id", "name", "prefecture_id"])
        .order("hall_id", false);
    let mut halls = HashMap::new();
    for row in fetch_all_rows(store, &query, page_size).await? {
        let (Some(id), Some(name), Some(pid)) = (
            row.get("hall_id").and_then(Value::as_i64),
            row.get("name").and_then(Value::as_str),
            row.get("prefecture_id").and_then(Value::as_i64),
        ) else {
            warn!("malformed halls row: {:?}", row);
            continue;
        };
        halls.insert((pid, name.to_string()), id);
    }

    Ok(IdMaps {
        prefectures,
        halls,
        models,
    })
}

async fn read_name_ids(
    store: &dyn Store,
    table: &str,
    id_column: &str,
    page_size: usize,
) -> Result<HashMap<String, i64>> {
    let query = Select::from(table).columns(&[id_column, "name"]).order(id_column, false);
    let mut map = HashMap::new();
    for row in fetch_all_rows(store, &query, page_size).await? {
        match (
            row.get(id_column).and_then(Value::as_i64),
            row.get("name").and_then(Value::as_str),
        ) {
            (Some(id), Some(name)) => {
                map.insert(name.to_string(), id);
            }
            _ => warn!("malformed {} row: {:?}", table, row),
        }
    }
    Ok(map)
}

fn named_row(name: &str) -> Row {
    row_from(json!({ "name": name }))
}

fn row_from(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStore;
    use crate::storage::RESULT_JOINED;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn record(pref: &str, hall: &str, model: &str, unit_no: i64, day: u32, medal: i64) -> CleanRecord {
        CleanRecord {
            pref: pref.to_string(),
            hall: hall.to_string(),
            model: model.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 11, day).unwrap(),
            unit_no,
            game: 6000,
            bb: 24,
            rb: 18,
            medal,
        }
    }

    fn sample() -> Vec<CleanRecord> {
        vec![
            record("東京都", "大山オーシャン", "マイジャグラーV", 101, 14, 1200),
            record("東京都", "大山オーシャン", "マイジャグラーV", 102, 14, -300),
            record("東京都", "楽園池袋店", "ミスタージャグラー", 5, 14, 40),
            record("埼玉県", "大山オーシャン", "マイジャグラーV", 101, 14, 700),
        ]
    }

    async fn count(store: &dyn Store, table: &str) -> usize {
        fetch_all_rows(store, &Select::from(table), 100).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_load_into_empty_store() {
        let store = SqliteStore::in_memory().unwrap();
        let report = load(&store, &sample(), 1000, 1000).await.unwrap();

        assert_eq!(report.models, 2);
        assert_eq!(report.prefectures, 2);
        // same hall name in two prefectures is two halls
        assert_eq!(report.halls, 3);
        assert_eq!(report.results, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(count(&store, RESULT_JOINED).await, 4);
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        load(&store, &sample(), 2, 1000).await.unwrap();
        load(&store, &sample(), 2, 1000).await.unwrap();

        assert_eq!(count(&store, MODELS).await, 2);
        assert_eq!(count(&store, PREFECTURES).await, 2);
        assert_eq!(count(&store, HALLS).await, 3);
        assert_eq!(count(&store, RESULTS).await, 4);
    }

    #[tokio::test]
    async fn test_reload_updates_values() {
        let store = SqliteStore::in_memory().unwrap();
        load(&store, &sample(), 1000, 1000).await.unwrap();

        let mut changed = sample();
        changed[0].medal = 9999;
        load(&store, &changed, 1000, 1000).await.unwrap();

        let rows = fetch_all_rows(
            &store,
            &Select::from(RESULT_JOINED).eq("unit_no", 101).eq("pref", "東京都"),
            100,
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["medal"], json!(9999));
    }

    #[test]
    fn test_resolve_drops_unknown_references() {
        let mut ids = IdMaps::default();
        ids.prefectures.insert("東京都".to_string(), 1);
        ids.halls.insert((1, "大山オーシャン".to_string()), 10);
        ids.models.insert("マイジャグラーV".to_string(), 100);

        let (rows, skipped) = resolve_results(&sample(), &ids);
        // 楽園池袋店 has no hall id, 埼玉県 has no prefecture id
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(rows[0]["hall_id"], json!(10));
        assert_eq!(rows[0]["model_id"], json!(100));
        assert_eq!(rows[0]["date"], json!("2025-11-14"));
    }

    /// Records selects and upsert order, fails the chosen results batch, and
    /// rejects a batch touching one key twice as Postgres does
    struct RecordingStore {
        inner: SqliteStore,
        selects: Mutex<Vec<Select>>,
        upserts: Mutex<Vec<String>>,
        fail_results_batch: Option<usize>,
        results_batches: Mutex<usize>,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn select(&self, query: &Select, offset: usize, limit: usize) -> Result<Vec<Row>> {
            self.selects.lock().unwrap().push(query.clone());
            self.inner.select(query, offset, limit).await
        }

        async fn upsert(
            &self,
            table: &str,
            rows: &[Row],
            conflict_columns: &[&str],
            mode: OnConflict,
        ) -> Result<()> {
            self.upserts.lock().unwrap().push(table.to_string());
            let mut keys = BTreeSet::new();
            for row in rows {
                let key: Vec<String> = conflict_columns.iter().map(|c| row[*c].to_string()).collect();
                if !keys.insert(key) {
                    anyhow::bail!("ON CONFLICT DO UPDATE command cannot affect row a second time");
                }
            }
            if table == RESULTS {
                let n = {
                    let mut batches = self.results_batches.lock().unwrap();
                    *batches += 1;
                    *batches - 1
                };
                if self.fail_results_batch == Some(n) {
                    anyhow::bail!("simulated transport error");
                }
            }
            self.inner.upsert(table, rows, conflict_columns, mode).await
        }
    }

    fn recording(fail_results_batch: Option<usize>) -> RecordingStore {
        RecordingStore {
            inner: SqliteStore::in_memory().unwrap(),
            selects: Mutex::new(Vec::new()),
            upserts: Mutex::new(Vec::new()),
            fail_results_batch,
            results_batches: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn test_references_before_facts() {
        let store = recording(None);
        load(&store, &sample(), 1000, 1000).await.unwrap();

        let order = store.upserts.lock().unwrap().clone();
        assert_eq!(order, vec![MODELS, PREFECTURES, HALLS, RESULTS]);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_load() {
        let store = recording(Some(0));
        let report = load(&store, &sample(), 2, 1000).await.unwrap();

        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.results, 2);
        assert_eq!(count(&store, RESULTS).await, 2);
    }

    #[tokio::test]
    async fn test_reference_reads_are_ordered() {
        let store = recording(None);
        load(&store, &sample(), 1000, 1).await.unwrap();

        let selects = store.selects.lock().unwrap().clone();
        for (table, id) in [(MODELS, "model_id"), (PREFECTURES, "prefecture_id"), (HALLS, "hall_id")] {
            let reads: Vec<&Select> = selects.iter().filter(|q| q.table == table).collect();
            // page size 1 means one read per row plus the short page
            assert!(reads.len() > 1, "{} read in one page", table);
            assert!(reads.iter().all(|q| q.order.first().map(|o| o.column.as_str()) == Some(id)));
        }
    }

    #[tokio::test]
    async fn test_duplicate_keys_keep_last_row() {
        let mut records = sample();
        records.push(record("東京都", "大山オーシャン", "マイジャグラーV", 101, 14, 4321));

        let store = recording(None);
        let report = load(&store, &records, 1000, 1000).await.unwrap();
        assert_eq!(report.failed_batches, 0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.results, 4);

        let rows = fetch_all_rows(
            &store,
            &Select::from(RESULT_JOINED).eq("unit_no", 101).eq("pref", "東京都"),
            100,
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["medal"], json!(4321));
    }

    #[test]
    fn test_dedupe_keeps_first_position() {
        let row = |unit: i64, medal: i64| {
            row_from(json!({"hall_id": 1, "model_id": 2, "unit_no": unit, "date": "2025-11-14", "medal": medal}))
        };
        let (rows, duplicates) = dedupe_results(vec![row(1, 10), row(2, 20), row(1, 30)]);
        assert_eq!(duplicates, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["unit_no"], json!(1));
        assert_eq!(rows[0]["medal"], json!(30));
        assert_eq!(rows[1]["medal"], json!(20));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let store = SqliteStore::in_memory().unwrap();
        let report = load(&store, &[], 1000, 1000).await.unwrap();
        assert_eq!(report, LoadReport::default());
    }
}
