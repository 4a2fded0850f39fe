//! Scrapes every configured hall into the raw results file.
//!
//! Halls are processed one at a time, each in its own browser session. A
//! failing hall is logged and left out; the rest of the batch continues.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use super::browser::{PageSession, SessionFactory};
use super::hall_url;
use super::parsers::date_page::MODEL_LINK_SELECTOR;
use super::parsers::hall_page::DATE_LINK_SELECTOR;
use super::parsers::model_page::{RAW_COLUMNS, RESULT_TABLE_SELECTOR};
use super::parsers::{DateLink, DatePageParser, HallPageParser, ModelLink, ModelPageParser, RawResultRow};
use crate::config::{AppConfig, HallInfo};

/// Halls scraped in test mode
pub const TEST_MODE_HALLS: usize = 2;

/// Everything collected for one hall
#[derive(Debug, Default)]
pub struct HallScrape {
    pub pref: String,
    pub hall: String,
    pub date_links: Vec<DateLink>,
    pub model_links: Vec<ModelLink>,
    pub rows: Vec<RawResultRow>,
}

/// Outcome of a scrape run
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub halls_ok: usize,
    /// Slugs of halls that failed
    pub halls_failed: Vec<String>,
    pub rows: usize,
    pub output: PathBuf,
}

/// Scrape all halls and write `all_result_data.csv`
pub async fn scrape_all_halls(
    factory: &dyn SessionFactory,
    config: &AppConfig,
    halls: &[HallInfo],
    test_mode: bool,
    today: NaiveDate,
) -> Result<ScrapeReport> {
    let started = Instant::now();
    config.paths.ensure_dirs()?;

    let halls = if test_mode {
        info!("Test mode: limiting to {} halls", TEST_MODE_HALLS);
        &halls[..halls.len().min(TEST_MODE_HALLS)]
    } else {
        halls
    };

    let mut report = ScrapeReport {
        output: config.paths.raw_results_csv(),
        ..Default::default()
    };
    let mut all_rows = Vec::new();

    for (i, hall) in halls.iter().enumerate() {
        info!("[{}/{}] Scraping hall: {}", i + 1, halls.len(), hall.slug);
        match scrape_hall(factory, config, hall, today).await {
            Ok(scraped) => {
                info!(
                    "{}: {} dates, {} models, {} rows",
                    scraped.hall,
                    scraped.date_links.len(),
                    scraped.model_links.len(),
                    scraped.rows.len()
                );
                report.halls_ok += 1;
                all_rows.extend(scraped.rows);
            }
            Err(e) => {
                error!("Hall {} failed: {:#}", hall.slug, e);
                report.halls_failed.push(hall.slug.clone());
            }
        }
    }

    write_raw_rows(&report.output, &all_rows)?;
    report.rows = all_rows.len();

    info!(
        "Scrape finished in {:.1}s: {} rows from {} halls ({} failed) -> {}",
        started.elapsed().as_secs_f64(),
        report.rows,
        report.halls_ok,
        report.halls_failed.len(),
        report.output.display()
    );

    Ok(report)
}

/// Scrape one hall in a fresh session, closing it whatever the outcome
pub async fn scrape_hall(
    factory: &dyn SessionFactory,
    config: &AppConfig,
    hall: &HallInfo,
    today: NaiveDate,
) -> Result<HallScrape> {
    let mut session = factory.open().await.context("Failed to open browser session")?;
    let result = scrape_with_session(session.as_mut(), config, hall, today).await;
    if let Err(e) = session.close().await {
        warn!("Failed to close session for {}: {}", hall.slug, e);
    }
    result
}

async fn scrape_with_session(
    session: &mut dyn PageSession,
    config: &AppConfig,
    hall: &HallInfo,
    today: NaiveDate,
) -> Result<HallScrape> {
    let scraper = &config.scraper;
    let url = hall_url(&scraper.base_url, &hall.slug)?;

    let page = session
        .load(url.as_str(), DATE_LINK_SELECTOR, scraper.hall_links_timeout())
        .await?;
    if !page.selector_found {
        anyhow::bail!(
            "Date link table did not appear within {:?}: {}",
            scraper.hall_links_timeout(),
            url
        );
    }

    let hall_page = HallPageParser::parse(&page.html, &url, hall.period as usize, today)?;
    let prefix = artifact_prefix(&hall_page.pref, &hall_page.hall);

    if scraper.screenshots {
        let path = config.paths.img_dir().join(format!("{}.jpg", prefix));
        if let Err(e) = session.screenshot(&path).await {
            warn!("Screenshot failed for {}: {}", hall.slug, e);
        }
    }

    let mut model_links = Vec::new();
    for date_link in &hall_page.links {
        let page = session
            .load(&date_link.date_url, MODEL_LINK_SELECTOR, scraper.model_links_timeout())
            .await?;
        if !page.selector_found {
            warn!(
                "Model link table did not appear within {:?}: {}",
                scraper.model_links_timeout(),
                date_link.date_url
            );
            continue;
        }
        model_links.extend(DatePageParser::parse(&page.html, date_link, &scraper.target_family)?);
    }

    let mut rows = Vec::new();
    for model_link in &model_links {
        let page = session
            .load(&model_link.model_url, RESULT_TABLE_SELECTOR, scraper.result_table_timeout())
            .await?;
        if !page.selector_found {
            warn!("Result table did not appear: {}", model_link.model_url);
            continue;
        }
        rows.extend(ModelPageParser::parse(&page.html, model_link)?);
    }

    let csv_dir = config.paths.csv_dir();
    write_csv(&csv_dir.join(format!("{}_date_urls.csv", prefix)), &hall_page.links)?;
    write_csv(&csv_dir.join(format!("{}_model_urls.csv", prefix)), &model_links)?;
    write_raw_rows(&csv_dir.join(format!("{}_result_data.csv", prefix)), &rows)?;

    Ok(HallScrape {
        pref: hall_page.pref,
        hall: hall_page.hall,
        date_links: hall_page.links,
        model_links,
        rows,
    })
}

/// `<pref>_<hall>` with path separators replaced
fn artifact_prefix(pref: &str, hall: &str) -> String {
    format!("{}_{}", pref, hall)
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ' ') { '_' } else { c })
        .collect()
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write raw rows in the fixed column order, header included even when empty
pub fn write_raw_rows(path: &Path, rows: &[RawResultRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(RAW_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
