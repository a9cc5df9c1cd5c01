//! Headless Chrome launcher and full-page capture.
//!
//! headless_chrome is blocking; every entry point here runs its browser work
//! on a `spawn_blocking` thread and never lets a navigation failure escape
//! as an error. A page that will not load is a signal, not a fault.

use anyhow::Context;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::domain_utils;

/// Rendered screenshot on disk. The file is deleted when the artifact is
/// dropped, so it never outlives the extraction that produced it.
#[derive(Debug)]
pub struct ScreenshotArtifact {
    path: PathBuf,
}

impl ScreenshotArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScreenshotArtifact {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove screenshot {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Launch a headless Chrome instance.
/// Disables the sandbox inside containers (detected via /.dockerenv or
/// PHISHHUNTER_CONTAINER) and honours `chrome_path` / CHROME_PATH.
pub fn create_browser(config: &BrowserConfig) -> anyhow::Result<Browser> {
    let is_container = std::env::var("PHISHHUNTER_CONTAINER").is_ok()
        || Path::new("/.dockerenv").exists();

    let chrome_path = config
        .chrome_path
        .clone()
        .or_else(|| std::env::var("CHROME_PATH").ok().map(PathBuf::from));

    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(!is_container)
        .path(chrome_path)
        .idle_browser_timeout(config.page_load_timeout() * 6)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;

    Browser::new(options).context("Failed to launch headless Chrome")
}

/// Navigate with a hard page-load timeout.
fn open_page(browser: &Browser, url: &str, timeout: Duration) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab().context("Failed to create tab")?;
    tab.set_default_timeout(timeout);
    tab.navigate_to(url).context("Navigation failed")?;
    tab.wait_until_navigated().context("Page load failed")?;
    Ok(tab)
}

fn scroll_dimension(tab: &Tab, axis: &str) -> anyhow::Result<u32> {
    let remote = tab
        .evaluate(&format!("document.body.parentNode.scroll{}", axis), false)
        .with_context(|| format!("Failed to read scroll{}", axis))?;
    remote
        .value
        .as_ref()
        .and_then(|v| v.as_f64())
        .map(|v| v.max(1.0) as u32)
        .ok_or_else(|| anyhow::anyhow!("scroll{} was not numeric", axis))
}

fn capture_blocking(config: &BrowserConfig, url: &str, timeout: Duration) -> anyhow::Result<ScreenshotArtifact> {
    let browser = create_browser(config)?;
    let tab = open_page(&browser, url, timeout)?;

    let width = scroll_dimension(&tab, "Width")?;
    let height = scroll_dimension(&tab, "Height")?;
    tab.set_bounds(Bounds::Normal {
        left: Some(0),
        top: Some(0),
        width: Some(width as f64),
        height: Some(height as f64),
    })
    .context("Failed to resize viewport")?;

    let png = tab
        .wait_for_element("body")
        .context("Page has no body")?
        .capture_screenshot(CaptureScreenshotFormatOption::Png)
        .context("Screenshot failed")?;

    fs::create_dir_all(&config.screenshot_dir)
        .with_context(|| format!("Failed to create {}", config.screenshot_dir.display()))?;
    let path = config
        .screenshot_dir
        .join(format!("{}.png", uuid::Uuid::new_v4()));

    // Wrap before writing so a partial write is still cleaned up
    let artifact = ScreenshotArtifact::new(path);
    fs::write(artifact.path(), &png)
        .with_context(|| format!("Failed to write {}", artifact.path().display()))?;

    debug!("Captured {}x{} screenshot of {} to {}", width, height, url, artifact.path().display());
    Ok(artifact)
}

/// Render `url` and save a full-page screenshot of its body.
///
/// Returns `None` on any failure, including the page-load timeout.
pub async fn capture_page(config: &BrowserConfig, url: &str, timeout: Duration) -> Option<ScreenshotArtifact> {
    if !config.enabled {
        return None;
    }

    let config = config.clone();
    let target = domain_utils::normalize_url(url);
    let task = tokio::task::spawn_blocking(move || capture_blocking(&config, &target, timeout));

    match task.await {
        Ok(Ok(artifact)) => Some(artifact),
        Ok(Err(e)) => {
            debug!("Capture of {} failed: {:#}", url, e);
            None
        }
        Err(e) => {
            debug!("Capture task for {} panicked: {}", url, e);
            None
        }
    }
}

/// Rendered DOM of `url`, or `None` when the page cannot be loaded.
pub async fn render_source(config: &BrowserConfig, url: &str) -> Option<String> {
    if !config.enabled {
        return None;
    }

    let config = config.clone();
    let target = domain_utils::normalize_url(url);
    let timeout = config.page_load_timeout();
    let task = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let browser = create_browser(&config)?;
        let tab = open_page(&browser, &target, timeout)?;
        tab.get_content().context("Failed to read page content")
    });

    match task.await {
        Ok(Ok(html)) => Some(html),
        Ok(Err(e)) => {
            debug!("Rendering {} failed: {:#}", url, e);
            None
        }
        Err(e) => {
            debug!("Render task for {} panicked: {}", url, e);
            None
        }
    }
}
