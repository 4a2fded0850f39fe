//! CLI commands for slot-api.
//!
//! Supports API server mode and the scrape, clean and load batch stages.

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{load_halls, AppConfig};
use crate::pipeline::{clean_file, clean::read_cleaned, CleanReport};
use crate::scraper::{scrape_all_halls, ChromeSessionFactory, ScrapeReport};
use crate::storage::loader::{self, LoadReport};
use crate::storage::{open_store, Role};

#[derive(Parser)]
#[command(name = "slot-api")]
#[command(version, about = "Slot hall results: scraper, loader and dashboard API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to, overriding `server.host`
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to, overriding `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Scrape every configured hall into the raw results CSV
    Scrape {
        /// Halls YAML file override
        #[arg(long, value_name = "FILE")]
        halls: Option<PathBuf>,

        /// Only scrape the first two halls
        #[arg(short, long)]
        test_mode: bool,
    },

    /// Clean the raw results CSV
    Clean {
        /// Raw CSV override
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Cleaned CSV override
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load the cleaned results CSV into the store
    Load {
        /// Cleaned CSV override
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Scrape, clean and load in one go
    Run {
        /// Halls YAML file override
        #[arg(long, value_name = "FILE")]
        halls: Option<PathBuf>,

        /// Only scrape the first two halls
        #[arg(short, long)]
        test_mode: bool,
    },
}

/// Apply `serve` flags on top of the file and env configuration.
pub fn apply_server_overrides(config: &mut AppConfig, host: Option<String>, port: Option<u16>) {
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }
}

/// Scrape all halls.
pub async fn run_scrape(config: &AppConfig, halls: Option<PathBuf>, test_mode: bool) -> anyhow::Result<ScrapeReport> {
    let halls_file = halls.unwrap_or_else(|| PathBuf::from(&config.scraper.halls_file));
    let halls = load_halls(&halls_file)?;
    info!("Loaded {} halls from {}", halls.len(), halls_file.display());

    let factory = ChromeSessionFactory::new(config.scraper.clone());
    let today = Local::now().date_naive();
    let report = scrape_all_halls(&factory, config, &halls, test_mode, today).await?;

    println!(
        "Scraped {} rows from {} halls ({} failed) -> {}",
        report.rows,
        report.halls_ok,
        report.halls_failed.len(),
        report.output.display()
    );
    for slug in &report.halls_failed {
        warn!("Hall failed: {}", slug);
    }
    Ok(report)
}

/// Clean the raw CSV.
pub fn run_clean(config: &AppConfig, input: Option<PathBuf>, output: Option<PathBuf>) -> anyhow::Result<CleanReport> {
    let input = input.unwrap_or_else(|| config.paths.raw_results_csv());
    let output = output.unwrap_or_else(|| config.paths.cleaned_results_csv());
    config.paths.ensure_dirs()?;

    let report = clean_file(&input, &output, &config.paths.rejected_results_csv())
        .with_context(|| format!("Failed to clean {}", input.display()))?;

    println!(
        "Cleaned {} rows ({} rejected) -> {}",
        report.rows.len(),
        report.rejected.len(),
        output.display()
    );
    Ok(report)
}

/// Load the cleaned CSV.
pub async fn run_load(config: &AppConfig, input: Option<PathBuf>) -> anyhow::Result<LoadReport> {
    let input = input.unwrap_or_else(|| config.paths.cleaned_results_csv());
    let records = read_cleaned(&input)?;
    info!("Read {} cleaned rows from {}", records.len(), input.display());

    let store = open_store(&config.store, Role::Write)?;
    let report = loader::load(
        store.as_ref(),
        &records,
        config.store.batch_size,
        config.store.page_size,
    )
    .await?;

    println!(
        "Loaded {} results ({} skipped, {} duplicates, {} failed batches); {} models, {} prefectures, {} halls",
        report.results,
        report.skipped,
        report.duplicates,
        report.failed_batches,
        report.models,
        report.prefectures,
        report.halls
    );
    if report.failed_batches > 0 {
        warn!("{} result batches failed", report.failed_batches);
    }
    Ok(report)
}

/// Scrape, clean and load.
pub async fn run_pipeline(config: &AppConfig, halls: Option<PathBuf>, test_mode: bool) -> anyhow::Result<()> {
    let scraped = run_scrape(config, halls, test_mode).await?;
    if scraped.rows == 0 {
        anyhow::bail!("No rows scraped; skipping clean and load");
    }
    run_clean(config, Some(scraped.output), None)?;
    run_load(config, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.csv_dir = dir.path().join("csv").to_string_lossy().to_string();
        config.paths.img_dir = dir.path().join("imgs").to_string_lossy().to_string();
        config.store.backend = StoreBackend::Sqlite;
        config.store.sqlite_path = dir.path().join("slot.db").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["slot-api", "scrape", "--test-mode"]).unwrap();
        assert!(matches!(cli.command, Commands::Scrape { test_mode: true, halls: None }));

        let cli = Cli::try_parse_from(["slot-api", "serve", "-p", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { host: None, port: Some(9000) }));
    }

    #[test]
    fn test_serve_without_flags_keeps_configured_address() {
        let mut config = AppConfig::default();
        config.server.host = "0.0.0.0".to_string();
        config.server.port = 9999;

        let cli = Cli::try_parse_from(["slot-api", "serve"]).unwrap();
        let Commands::Serve { host, port } = cli.command else {
            panic!("expected serve");
        };
        apply_server_overrides(&mut config, host, port);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);

        let cli = Cli::try_parse_from(["slot-api", "serve", "-p", "9000"]).unwrap();
        let Commands::Serve { host, port } = cli.command else {
            panic!("expected serve");
        };
        apply_server_overrides(&mut config, host, port);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[tokio::test]
    async fn test_clean_then_load() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        config.paths.ensure_dirs().unwrap();
        fs::write(
            config.paths.raw_results_csv(),
            "pref,hall,model,date,台番,G数,BB,RB,差枚\n\
             東京都,A,SアイムジャグラーEX,2025-11-14,1,\"3,000\",10,5,-300\n\
             東京都,A,SアイムジャグラーEX,2025-11-14,2,abc,10,5,-300\n",
        )
        .unwrap();

        let cleaned = run_clean(&config, None, None).unwrap();
        assert_eq!(cleaned.rows.len(), 1);
        assert_eq!(cleaned.rejected.len(), 1);

        let report = run_load(&config, None).await.unwrap();
        assert_eq!(report.results, 1);
        assert_eq!(report.failed_batches, 0);
    }
}
