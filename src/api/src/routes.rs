//! API route handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::config::AppConfig;
use crate::dashboard::pages::day_last_stats::{self, DayLastStatsPage};
use crate::dashboard::pages::database::{self, DatabasePage};
use crate::dashboard::pages::hall_history::{self, HallHistoryPage};
use crate::dashboard::pages::model_history::{self, ModelHistoryPage};
use crate::dashboard::pages::top::{self, TopPage};
use crate::dashboard::pages::unit_history::{self, UnitHistoryPage};
use crate::dashboard::PageContext;
use crate::storage::fetch::Fetcher;
use crate::types::{ErrorResponse, HealthResponse};

/// Application state shared across handlers.
pub struct AppState {
    pub fetcher: Fetcher,
    pub config: AppConfig,
}

type Params = Query<HashMap<String, String>>;

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

fn invalid_params(e: anyhow::Error) -> ApiError {
    ApiError::bad_request(format!("{:#}", e))
}

fn page_failed(e: anyhow::Error) -> ApiError {
    error!("Page build failed: {:#}", e);
    ApiError::internal(format!("Failed to load results: {}", e))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Latest results.
pub async fn top_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<TopPage>, ApiError> {
    let ctx = PageContext::recent(today(), top::DAYS, params).map_err(invalid_params)?;
    let page = top::render(&state.fetcher, &ctx).await.map_err(page_failed)?;
    Ok(Json(page))
}

/// Raw result browser.
pub async fn database_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<DatabasePage>, ApiError> {
    let ctx = PageContext::recent(today(), database::DAYS, params).map_err(invalid_params)?;
    let page = database::render(&state.fetcher, &ctx).await.map_err(page_failed)?;
    Ok(Json(page))
}

pub async fn model_history_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<ModelHistoryPage>, ApiError> {
    let ctx = PageContext::recent(today(), model_history::DAYS, params).map_err(invalid_params)?;
    let page = model_history::render(&state.fetcher, &ctx, &state.config.dashboard)
        .await
        .map_err(page_failed)?;
    Ok(Json(page))
}

pub async fn unit_history_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<UnitHistoryPage>, ApiError> {
    let ctx = PageContext::recent(today(), unit_history::DAYS, params).map_err(invalid_params)?;
    let page = unit_history::render(&state.fetcher, &ctx, &state.config.dashboard)
        .await
        .map_err(page_failed)?;
    Ok(Json(page))
}

pub async fn hall_history_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<HallHistoryPage>, ApiError> {
    let ctx = PageContext::recent(today(), hall_history::DAYS, params).map_err(invalid_params)?;
    let page = hall_history::render(&state.fetcher, &ctx, &state.config.dashboard)
        .await
        .map_err(page_failed)?;
    Ok(Json(page))
}

pub async fn day_last_stats_page(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Result<Json<DayLastStatsPage>, ApiError> {
    let ctx = day_last_stats::context(today(), params).map_err(invalid_params)?;
    let page = day_last_stats::render(&state.fetcher, &ctx, &state.config.dashboard)
        .await
        .map_err(page_failed)?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CleanRecord;
    use crate::storage::{loader, SqliteStore};
    use crate::dashboard::DateRange;
    use chrono::{Datelike, Days};

    fn record(hall: &str, unit_no: i64, date: NaiveDate, game: i64, medal: i64) -> CleanRecord {
        CleanRecord {
            pref: "東京都".to_string(),
            hall: hall.to_string(),
            model: "マイジャグラーV".to_string(),
            date,
            unit_no,
            game,
            bb: 20,
            rb: 10,
            medal,
        }
    }

    async fn state() -> Arc<AppState> {
        let yesterday = today() - Days::new(1);
        state_with(vec![
            record("A", 1, yesterday, 6000, 900),
            record("A", 2, yesterday, 3000, -600),
            record("B", 5, yesterday - Days::new(1), 4000, 0),
            record("B", 5, yesterday - Days::new(20), 4000, 0),
        ])
        .await
    }

    async fn state_with(records: Vec<CleanRecord>) -> Arc<AppState> {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        loader::load(store.as_ref(), &records, 1000, 1000).await.unwrap();
        Arc::new(AppState {
            fetcher: Fetcher::new(store, 1000),
            config: AppConfig::default(),
        })
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        Query(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_top_page() {
        let Json(page) = top_page(State(state().await), params(&[])).await.unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.halls, 2);
        assert_eq!(page.rows[0].hall, "A");
    }

    #[tokio::test]
    async fn test_database_page_selection() {
        let Json(page) = database_page(State(state().await), params(&[("hall", "B"), ("unit", "ALL")]))
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.rows[0].unit_no, 5);
    }

    #[tokio::test]
    async fn test_unit_history_range() {
        let Json(page) = unit_history_page(State(state().await), params(&[("hall", "B")]))
            .await
            .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.games.columns.len(), 2);
    }

    #[tokio::test]
    async fn test_model_and_hall_history() {
        let state = state().await;
        let Json(page) = model_history_page(State(state.clone()), params(&[("hall", "ALL")]))
            .await
            .unwrap();
        assert_eq!(page.count, 3);

        let Json(page) = hall_history_page(State(state), params(&[])).await.unwrap();
        assert_eq!(page.rate.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_day_last_stats_without_history() {
        // no unit has three plays on one day digit in the previous months
        let Json(page) = day_last_stats_page(State(state().await), params(&[("hall", "ALL"), ("day", "ALL")]))
            .await
            .unwrap();
        assert!(page.rows.is_empty());
        assert!(page.notice.is_some());
    }

    #[tokio::test]
    async fn test_day_last_stats_with_history() {
        let window = DateRange::previous_months(today(), day_last_stats::MONTHS);
        let mut records: Vec<CleanRecord> = [2, 12, 22]
            .into_iter()
            .map(|offset| record("A", 1, window.start + Days::new(offset), 4000, 800))
            .collect();
        // unit 2 loses every play
        records.extend(
            [4, 14, 24]
                .into_iter()
                .map(|offset| record("A", 2, window.start + Days::new(offset), 4000, -800)),
        );
        let yesterday = today() - Days::new(1);
        records.push(record("A", 1, yesterday, 100, 0));
        records.push(record("A", 2, yesterday, 100, 0));

        let Json(page) = day_last_stats_page(State(state_with(records).await), params(&[("hall", "ALL"), ("day", "ALL")]))
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        let row = &page.rows[0];
        assert_eq!((row.hall.as_str(), row.unit_no), ("A", 1));
        assert_eq!(row.day_last, (window.start + Days::new(2)).day() % 10);
        assert_eq!(row.count, 3);
        assert_eq!(row.win_rate, 1.0);
        assert_eq!(row.game, 12000);
        assert!(page.notice.is_none());
    }

    #[tokio::test]
    async fn test_malformed_date_is_bad_request() {
        let err = top_page(State(state().await), params(&[("start", "yesterday")]))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Invalid start date"));

        let err = day_last_stats_page(State(state().await), params(&[("win_rate", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
