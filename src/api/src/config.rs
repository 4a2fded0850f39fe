//! Configuration for the slot data pipeline and dashboard API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Site root; hall pages live under `{base_url}/tag/{slug}`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_halls_file")]
    pub halls_file: String,
    /// Substring a model link must contain to be scraped
    #[serde(default = "default_target_family")]
    pub target_family: String,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_hall_links_timeout")]
    pub hall_links_timeout_secs: u64,
    #[serde(default = "default_model_links_timeout")]
    pub model_links_timeout_secs: u64,
    #[serde(default = "default_result_table_timeout")]
    pub result_table_timeout_secs: u64,
    /// Save a full-page screenshot of every hall page
    #[serde(default)]
    pub screenshots: bool,
    /// Chrome executable override
    #[serde(default)]
    pub chrome_path: Option<String>,
}

fn default_base_url() -> String {
    "https://min-repo.com".to_string()
}

fn default_halls_file() -> String {
    "config/halls.yaml".to_string()
}

fn default_target_family() -> String {
    "ジャグラー".to_string()
}

fn default_navigation_timeout() -> u64 {
    90
}

fn default_hall_links_timeout() -> u64 {
    15
}

fn default_model_links_timeout() -> u64 {
    10
}

fn default_result_table_timeout() -> u64 {
    10
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            halls_file: default_halls_file(),
            target_family: default_target_family(),
            navigation_timeout_secs: default_navigation_timeout(),
            hall_links_timeout_secs: default_hall_links_timeout(),
            model_links_timeout_secs: default_model_links_timeout(),
            result_table_timeout_secs: default_result_table_timeout(),
            screenshots: false,
            chrome_path: None,
        }
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn hall_links_timeout(&self) -> Duration {
        Duration::from_secs(self.hall_links_timeout_secs)
    }

    pub fn model_links_timeout(&self) -> Duration {
        Duration::from_secs(self.model_links_timeout_secs)
    }

    pub fn result_table_timeout(&self) -> Duration {
        Duration::from_secs(self.result_table_timeout_secs)
    }
}

/// Local artifact directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_csv_dir")]
    pub csv_dir: String,
    #[serde(default = "default_img_dir")]
    pub img_dir: String,
}

fn default_csv_dir() -> String {
    "data/csv".to_string()
}

fn default_img_dir() -> String {
    "data/imgs".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            csv_dir: default_csv_dir(),
            img_dir: default_img_dir(),
        }
    }
}

impl PathsConfig {
    pub fn csv_dir(&self) -> PathBuf {
        PathBuf::from(&self.csv_dir)
    }

    pub fn img_dir(&self) -> PathBuf {
        PathBuf::from(&self.img_dir)
    }

    /// Raw scrape output consumed by the cleaner
    pub fn raw_results_csv(&self) -> PathBuf {
        self.csv_dir().join("all_result_data.csv")
    }

    /// Cleaner output consumed by the loader
    pub fn cleaned_results_csv(&self) -> PathBuf {
        self.csv_dir().join("cleaned_all_result_data.csv")
    }

    pub fn rejected_results_csv(&self) -> PathBuf {
        self.csv_dir().join("rejected_result_data.csv")
    }

    /// Create artifact directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.csv_dir(), self.img_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Which backing store to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted PostgREST endpoint
    #[default]
    Rest,
    /// Local SQLite file with the same tables
    Sqlite,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    /// Rows per request when paging through a table
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Rows per upsert request when loading results
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_sqlite_path() -> String {
    "data/slot.db".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_batch_size() -> usize {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Dashboard thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Payout rate at or above which a cell is highlighted
    #[serde(default = "default_payout_highlight")]
    pub payout_highlight: f64,
    /// Game cells at or above `mean * factor` are highlighted
    #[serde(default = "default_game_highlight_factor")]
    pub game_highlight_factor: f64,
    /// Payout rate above which a unit-day counts as a win
    #[serde(default = "default_win_payout_rate")]
    pub win_payout_rate: f64,
}

fn default_payout_highlight() -> f64 {
    1.02
}

fn default_game_highlight_factor() -> f64 {
    1.3
}

fn default_win_payout_rate() -> f64 {
    1.03
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            payout_highlight: default_payout_highlight(),
            game_highlight_factor: default_game_highlight_factor(),
            win_payout_rate: default_win_payout_rate(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (SLOT_SERVER__PORT, SLOT_STORE__BACKEND, etc.)
            .add_source(
                config::Environment::with_prefix("SLOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// One hall entry from the halls file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HallInfo {
    /// Hall name as used in the listing URL
    pub slug: String,
    /// Number of most recent dates to pull
    pub period: u32,
}

#[derive(Debug, Deserialize)]
struct HallsFile {
    #[serde(default)]
    halls: Vec<HallInfo>,
}

/// Parse the halls YAML document
pub fn parse_halls(yaml: &str) -> Result<Vec<HallInfo>> {
    let file: HallsFile = serde_yaml::from_str(yaml).context("Failed to parse halls YAML")?;
    Ok(file.halls)
}

/// Load the hall list to scrape
pub fn load_halls(path: &Path) -> Result<Vec<HallInfo>> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Halls file not found: {}", path.display()))?;
    parse_halls(&yaml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.page_size, 1000);
        assert_eq!(config.store.batch_size, 1000);
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.scraper.target_family, "ジャグラー");
        assert_eq!(config.scraper.navigation_timeout(), Duration::from_secs(90));
        assert_eq!(config.dashboard.payout_highlight, 1.02);
    }

    #[test]
    fn test_artifact_paths() {
        let paths = PathsConfig::default();
        assert_eq!(
            paths.raw_results_csv(),
            PathBuf::from("data/csv/all_result_data.csv")
        );
        assert_eq!(
            paths.cleaned_results_csv(),
            PathBuf::from("data/csv/cleaned_all_result_data.csv")
        );
    }

    #[test]
    fn test_parse_halls() {
        let yaml = r#"
halls:
  - slug: 大山オーシャン
    period: 3
  - slug: やすだ東池袋9号店
    period: 1
"#;
        let halls = parse_halls(yaml).unwrap();
        assert_eq!(halls.len(), 2);
        assert_eq!(halls[0].slug, "大山オーシャン");
        assert_eq!(halls[0].period, 3);
        assert_eq!(halls[1].period, 1);
    }

    #[test]
    fn test_parse_halls_empty() {
        assert!(parse_halls("halls: []").unwrap().is_empty());
        assert!(parse_halls("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_halls_rejects_bad_period() {
        let yaml = "halls:\n  - slug: a\n    period: many\n";
        assert!(parse_halls(yaml).is_err());
    }

    #[test]
    fn test_load_halls_missing_file() {
        let err = load_halls(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(err.to_string().contains("Halls file not found"));
    }
}
