//! Storage module for slot hall results
//!
//! Reference tables (prefectures, halls, models), the results fact table and
//! the `result_joined` read view, reachable through either the hosted
//! PostgREST endpoint or a local SQLite file.

pub mod fetch;
pub mod loader;
pub mod query;
pub mod rest;
pub mod schema;
pub mod sqlite;

pub use query::Select;
pub use rest::{Credentials, RestStore, Role};
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};

/// One row as column name to JSON value
pub type Row = serde_json::Map<String, serde_json::Value>;

pub const MODELS: &str = "models";
pub const PREFECTURES: &str = "prefectures";
pub const HALLS: &str = "halls";
pub const RESULTS: &str = "results";
/// Read view joining results with hall, prefecture and model names
pub const RESULT_JOINED: &str = "result_joined";

/// What an upsert does with a row whose conflict key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the stored row
    Ignore,
    /// Overwrite the stored row
    Merge,
}

/// Table store used by the loader and the query layer
#[async_trait]
pub trait Store: Send + Sync {
    /// Rows `[offset, offset + limit)` of `query`
    async fn select(&self, query: &Select, offset: usize, limit: usize) -> Result<Vec<Row>>;

    /// Insert `rows`, resolving conflicts on `conflict_columns` per `mode`
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        mode: OnConflict,
    ) -> Result<()>;
}

/// Open the configured store with the given access role
pub fn open_store(config: &StoreConfig, role: Role) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Rest => {
            let credentials = Credentials::from_env(role)?;
            let timeout = Duration::from_secs(config.request_timeout_secs);
            Ok(Arc::new(RestStore::new(credentials, timeout)?))
        }
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(Path::new(&config.sqlite_path))?)),
    }
}
