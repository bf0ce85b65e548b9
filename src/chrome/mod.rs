//! Live Chrome backend: a browser session and the bridge host on top of it.

mod live;

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bridge::{ActionDefaults, Bridge, pauses_after};
use crate::config::ChromeConfig;
use crate::server::BridgeHost;
use crate::types::{ActionRequest, ActionResult, PageScanResult, PageState};

pub use live::LiveDocument;

/// One browser and the tab the bridge works in.
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
    settle: Duration,
}

impl BrowserSession {
    /// Attach to the configured DevTools endpoint, or launch a new Chrome
    /// when there is none or attaching fails.
    pub fn launch(config: &ChromeConfig) -> Result<Self> {
        if let Some(debug_url) = &config.debug_url {
            info!(%debug_url, "attaching to running Chrome");
            match Browser::connect(debug_url.clone()) {
                Ok(browser) => {
                    let existing = browser
                        .get_tabs()
                        .lock()
                        .map_err(|_| anyhow!("tab list lock poisoned"))?
                        .first()
                        .cloned();
                    let tab = match existing {
                        Some(tab) => tab,
                        None => browser.new_tab()?,
                    };
                    return Ok(Self {
                        browser,
                        tab,
                        settle: config.settle,
                    });
                }
                Err(err) => warn!(error = %err, "could not attach, launching instead"),
            }
        }

        let options = LaunchOptions {
            headless: config.headless,
            path: config.path.clone(),
            window_size: Some(config.window),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        info!(headless = config.headless, "launching Chrome");
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;

        Ok(Self {
            browser,
            tab,
            settle: config.settle,
        })
    }

    pub fn tab(&self) -> Arc<Tab> {
        self.tab.clone()
    }

    /// Switch to a fresh tab.
    pub fn new_tab(&mut self) -> Result<()> {
        self.tab = self.browser.new_tab()?;
        Ok(())
    }

    /// Load `url` and give the page a moment to settle.
    pub fn navigate(&self, url: &str) -> Result<()> {
        info!(url, "navigating");
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        std::thread::sleep(self.settle);
        Ok(())
    }

    /// Capture the current page and inject the bridge into it.
    pub fn bridge(&self, defaults: ActionDefaults) -> Result<Bridge<LiveDocument>> {
        open_bridge(self.tab(), defaults)
    }

    pub fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
        std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "screenshot saved");
        Ok(())
    }
}

fn open_bridge(tab: Arc<Tab>, defaults: ActionDefaults) -> Result<Bridge<LiveDocument>> {
    let doc = LiveDocument::capture(tab)?;
    Ok(Bridge::inject(doc, defaults)?)
}

/// Serves bridge calls against a live session. Every scan, state read and
/// action captures the page afresh; the session lock keeps them from
/// overlapping.
pub struct ChromeHost {
    session: Mutex<BrowserSession>,
    defaults: ActionDefaults,
}

impl ChromeHost {
    pub fn new(session: BrowserSession, defaults: ActionDefaults) -> Self {
        Self {
            session: Mutex::new(session),
            defaults,
        }
    }

    pub async fn screenshot(&self, path: &Path) -> Result<()> {
        let session = self.session.lock().await;
        tokio::task::block_in_place(|| session.screenshot(path))
    }

    /// Capture the current page, inject, and hand the bridge to `work` on
    /// a blocking thread.
    async fn with_bridge<T, F>(&self, session: &BrowserSession, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Bridge<LiveDocument>) -> T + Send + 'static,
    {
        let tab = session.tab();
        let defaults = self.defaults;
        tokio::task::spawn_blocking(move || {
            let mut bridge = open_bridge(tab, defaults)?;
            Ok::<_, anyhow::Error>(work(&mut bridge))
        })
        .await?
    }
}

#[async_trait]
impl BridgeHost for ChromeHost {
    async fn scan(&self) -> Result<PageScanResult> {
        let session = self.session.lock().await;
        self.with_bridge(&session, |bridge| bridge.scan()).await
    }

    async fn state(&self) -> Result<PageState> {
        let session = self.session.lock().await;
        self.with_bridge(&session, |bridge| bridge.get_state()).await
    }

    /// Each request runs against its own capture, so a step sees what the
    /// previous one left on the page.
    async fn perform(&self, requests: Vec<ActionRequest>) -> Result<Vec<ActionResult>> {
        let session = self.session.lock().await;
        let batch = requests.len() > 1;
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let pause = batch && pauses_after(&request) && !self.defaults.step_pause.is_zero();
            let runtime = tokio::runtime::Handle::current();
            let outcome = self
                .with_bridge(&session, move |bridge| runtime.block_on(bridge.perform(&request)))
                .await;
            results.push(outcome.unwrap_or_else(|err| {
                warn!(error = %format!("{err:#}"), "page capture failed");
                ActionResult::failure(format!("{err:#}"))
            }));
            if pause {
                tokio::time::sleep(self.defaults.step_pause).await;
            }
        }
        Ok(results)
    }

    fn supports_navigation(&self) -> bool {
        true
    }

    async fn goto(&self, url: String) -> Result<()> {
        let session = self.session.lock().await;
        tokio::task::block_in_place(|| session.navigate(&url))
    }
}
