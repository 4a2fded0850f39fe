//! Slot hall results
//!
//! Scrapes per-unit results from min-repo.com, cleans and loads them into
//! the results store, and serves the dashboard pages as JSON.

mod cli;
mod config;
mod dashboard;
mod pipeline;
mod routes;
mod scraper;
mod storage;
mod types;

use axum::{routing::get, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::routes::AppState;
use crate::storage::fetch::Fetcher;
use crate::storage::{open_store, Role};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slot_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Scrape { halls, test_mode } => cli::run_scrape(&config, halls, test_mode).await.map(|_| ()),
        Commands::Clean { input, output } => cli::run_clean(&config, input, output).map(|_| ()),
        Commands::Load { input } => cli::run_load(&config, input).await.map(|_| ()),
        Commands::Run { halls, test_mode } => cli::run_pipeline(&config, halls, test_mode).await,
    }
}

/// Run the API server.
async fn run_server(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    // Override with CLI args
    cli::apply_server_overrides(&mut config, host, port);

    tracing::info!("Configuration loaded");
    tracing::info!("Store backend: {:?}", config.store.backend);

    let store = open_store(&config.store, Role::Read)?;
    let state = Arc::new(AppState {
        fetcher: Fetcher::new(store, config.store.page_size),
        config: config.clone(),
    });

    // Build router
    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/pages/top", get(routes::top_page))
        .route("/pages/database", get(routes::database_page))
        .route("/pages/model-history", get(routes::model_history_page))
        .route("/pages/unit-history", get(routes::unit_history_page))
        .route("/pages/hall-history", get(routes::hall_history_page))
        .route("/pages/day-last-stats", get(routes::day_last_stats_page))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
