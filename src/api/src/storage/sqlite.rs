//! SQLite-backed store with the same tables and view as the hosted store

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::query::{validate_identifier, Select};
use super::schema::create_tables;
use super::{OnConflict, Row, Store};

/// Store on a local SQLite database
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a database file, initializing the schema if needed
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        create_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))
    }
}

/// Render `query` as SQL with positional parameters
pub fn select_sql(query: &Select, offset: usize, limit: usize) -> Result<(String, Vec<SqlValue>)> {
    query.validate()?;

    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", columns, query.table);
    let mut params = Vec::with_capacity(query.filters.len() + 2);

    for (i, f) in query.filters.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!("{} {} ?", f.column(), f.sql_op()));
        params.push(to_sql_value(f.value()));
    }

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{} {}", o.column, if o.desc { "DESC" } else { "ASC" }))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {}", order));
    }

    sql.push_str(" LIMIT ? OFFSET ?");
    params.push(SqlValue::Integer(limit as i64));
    params.push(SqlValue::Integer(offset as i64));

    Ok((sql, params))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn select(&self, query: &Select, offset: usize, limit: usize) -> Result<Vec<Row>> {
        let (sql, params) = select_sql(query, offset, limit)?;
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare: {}", sql))?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                let mut out = Row::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), to_json_value(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        mode: OnConflict,
    ) -> Result<()> {
        validate_identifier(table)?;
        for c in conflict_columns {
            validate_identifier(c)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for row in rows {
            let columns: Vec<&String> = row.keys().collect();
            for c in &columns {
                validate_identifier(c)?;
            }

            let updates: Vec<String> = columns
                .iter()
                .filter(|c| !conflict_columns.contains(&c.as_str()))
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            let action = match mode {
                OnConflict::Merge if !updates.is_empty() => {
                    format!("DO UPDATE SET {}", updates.join(", "))
                }
                _ => "DO NOTHING".to_string(),
            };

            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
                table,
                columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
                vec!["?"; columns.len()].join(", "),
                conflict_columns.join(", "),
                action
            );
            let values: Vec<SqlValue> = row.values().map(to_sql_value).collect();
            tx.execute(&sql, params_from_iter(values))
                .with_context(|| format!("Upsert into {} failed", table))?;
        }

        tx.commit()?;
        Ok(())
    }
}
