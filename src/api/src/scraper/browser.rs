//! Browser automation using chromiumoxide.
//!
//! Page loads go through the [`PageSession`] trait so the aggregator can be
//! driven by a scripted session in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as ChromeBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::config::ScraperConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Rendered page content after a load
#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub html: String,
    /// Whether the awaited selector appeared before the wait expired
    pub selector_found: bool,
}

/// A single-tab browsing session
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, then wait up to `wait` for `wait_for` to appear
    async fn load(&mut self, url: &str, wait_for: &str, wait: Duration) -> Result<LoadedPage>;

    /// Save a full-page JPEG of the current page
    async fn screenshot(&mut self, path: &Path) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens one session per hall
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageSession>>;
}

/// Browser wrapper for web scraping
pub struct Browser {
    browser: ChromeBrowser,
    handle: tokio::task::JoinHandle<()>,
    page: Option<Page>,
    navigation_timeout: Duration,
}

impl Browser {
    /// Launch a new headless browser instance
    pub async fn launch(config: &ScraperConfig) -> Result<Self> {
        let chrome_path = match &config.chrome_path {
            Some(path) => path.as_str(),
            None if cfg!(target_os = "macos") => {
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"
            }
            None if cfg!(target_os = "windows") => {
                "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe"
            }
            None => "google-chrome",
        };

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg("--lang=ja-JP")
            .window_size(1280, 2000)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = ChromeBrowser::launch(browser_config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to launch browser: {}", e))?;

        // Handler must keep running for the browser to work
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    continue;
                }
            }
        });

        Ok(Self {
            browser,
            handle,
            page: None,
            navigation_timeout: config.navigation_timeout(),
        })
    }

    async fn current_page(&mut self) -> Result<&Page> {
        if self.page.is_none() {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create new page: {}", e))?;
            self.page = Some(page);
        }
        self.page
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No page available"))
    }

    /// Poll for `selector` until it appears or `wait` elapses
    async fn wait_for_selector(page: &Page, selector: &str, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        loop {
            if page.find_element(selector).await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSession for Browser {
    async fn load(&mut self, url: &str, wait_for: &str, wait: Duration) -> Result<LoadedPage> {
        let navigation_timeout = self.navigation_timeout;
        let page = self.current_page().await?;

        debug!("Navigating to {}", url);
        timeout(navigation_timeout, page.goto(url))
            .await
            .with_context(|| format!("Navigation timed out after {:?}: {}", navigation_timeout, url))?
            .map_err(|e| anyhow::anyhow!("Navigation failed for {}: {}", url, e))?;

        let selector_found = Self::wait_for_selector(page, wait_for, wait).await;
        if !selector_found {
            debug!("{:?} not found within {:?} on {}", wait_for, wait, url);
        }

        let html = page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get page content: {}", e))?;

        Ok(LoadedPage {
            html,
            selector_found,
        })
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let page = self.current_page().await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(50)
            .full_page(true)
            .build();
        page.save_screenshot(params, path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to save screenshot {}: {}", path.display(), e))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Browser {
            mut browser,
            handle,
            page,
            ..
        } = *self;
        if let Some(page) = page {
            let _ = page.close().await;
        }
        let _ = browser.close().await;
        handle.abort();
        Ok(())
    }
}

/// Launches a fresh headless Chrome per session
pub struct ChromeSessionFactory {
    config: ScraperConfig,
}

impl ChromeSessionFactory {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn PageSession>> {
        let browser = Browser::launch(&self.config).await?;
        Ok(Box::new(browser))
    }
}
