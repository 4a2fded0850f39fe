//! Read helpers over the store.
//!
//! The hosted endpoint caps rows per request, so every read walks the query
//! page by page until a short page comes back.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::query::Select;
use super::{Row, Store, HALLS, MODELS, PREFECTURES};

/// Fetch every row of `query`, `page_size` rows per request
pub async fn fetch_all_rows(store: &dyn Store, query: &Select, page_size: usize) -> Result<Vec<Row>> {
    if page_size == 0 {
        anyhow::bail!("page_size must be positive");
    }

    let mut all_rows = Vec::new();
    let mut offset = 0;
    loop {
        let rows = store.select(query, offset, page_size).await?;
        let n = rows.len();
        all_rows.extend(rows);
        if n < page_size {
            break;
        }
        offset += page_size;
    }

    debug!("{}: {} rows", query.table, all_rows.len());
    Ok(all_rows)
}

/// Query layer bound to a store and page size
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn Store>,
    page_size: usize,
}

impl Fetcher {
    pub fn new(store: Arc<dyn Store>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Rows of `view` dated within `[start, end]`, optionally for one hall/model
    pub async fn fetch(
        &self,
        view: &str,
        start: NaiveDate,
        end: NaiveDate,
        hall: Option<&str>,
        model: Option<&str>,
    ) -> Result<Vec<Row>> {
        let query = with_hall_model(
            Select::from(view)
                .gte("date", start.to_string())
                .lte("date", end.to_string()),
            hall,
            model,
        );
        fetch_all_rows(self.store(), &query, self.page_size).await
    }

    /// Rows of a single day
    pub async fn fetch_one_day(
        &self,
        view: &str,
        date: NaiveDate,
        hall: Option<&str>,
        model: Option<&str>,
    ) -> Result<Vec<Row>> {
        self.fetch(view, date, date, hall, model).await
    }

    /// Latest date present under the hall/model filters
    pub async fn latest_date(
        &self,
        view: &str,
        hall: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<NaiveDate>> {
        let query = with_hall_model(
            Select::from(view).columns(&["date"]).order("date", true),
            hall,
            model,
        );
        let rows = self.store.select(&query, 0, 1).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let date = row
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("{} row without a date", view))?;
        Ok(Some(date.parse()?))
    }

    /// Rows of the latest date under the hall/model filters
    pub async fn fetch_latest(
        &self,
        view: &str,
        hall: Option<&str>,
        model: Option<&str>,
    ) -> Result<Vec<Row>> {
        match self.latest_date(view, hall, model).await? {
            Some(date) => self.fetch_one_day(view, date, hall, model).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn fetch_halls(&self) -> Result<Vec<Row>> {
        self.fetch_table_by_name(HALLS).await
    }

    pub async fn fetch_models(&self) -> Result<Vec<Row>> {
        self.fetch_table_by_name(MODELS).await
    }

    pub async fn fetch_prefectures(&self) -> Result<Vec<Row>> {
        self.fetch_table_by_name(PREFECTURES).await
    }

    async fn fetch_table_by_name(&self, table: &str) -> Result<Vec<Row>> {
        let query = Select::from(table).order("name", false);
        fetch_all_rows(self.store(), &query, self.page_size).await
    }

    /// Generic paged read with equality and range filters
    pub async fn fetch_paginated(
        &self,
        view: &str,
        eq: &[(&str, Value)],
        gte: &[(&str, Value)],
        lte: &[(&str, Value)],
        order_by: Option<&str>,
        desc: bool,
    ) -> Result<Vec<Row>> {
        let mut query = Select::from(view);
        for (col, val) in eq {
            query = query.eq(col, val.clone());
        }
        for (col, val) in gte {
            query = query.gte(col, val.clone());
        }
        for (col, val) in lte {
            query = query.lte(col, val.clone());
        }
        if let Some(col) = order_by {
            query = query.order(col, desc);
        }
        fetch_all_rows(self.store(), &query, self.page_size).await
    }
}

fn with_hall_model(mut query: Select, hall: Option<&str>, model: Option<&str>) -> Select {
    if let Some(hall) = hall {
        query = query.eq("hall", hall);
    }
    if let Some(model) = model {
        query = query.eq("model", model);
    }
    query
}
