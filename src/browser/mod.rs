//! Browser capability used by the login flow, the harvester and the extractor.
//!
//! Everything above this module talks to [`BrowserDriver`]; the Chromium
//! implementation lives in [`chrome`].

pub mod chrome;

use crate::config::RetryPolicy;
use crate::constants::LOGIN_TITLE_PREFIX;
use crate::error::Result;
use crate::session::SessionState;
use async_trait::async_trait;
use std::fmt;
use tracing::warn;

pub use chrome::{ChromeLauncher, ChromeSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserMode {
    /// A window the operator can see and type into.
    Visible,
    Headless,
}

impl fmt::Display for BrowserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserMode::Visible => f.write_str("visible"),
            BrowserMode::Headless => f.write_str("headless"),
        }
    }
}

/// A single controllable page in a live browser.
#[async_trait]
pub trait BrowserDriver: Send {
    fn mode(&self) -> BrowserMode;

    /// Load `url` and suspend until the page has loaded and settled. A single
    /// attempt; see [`navigate_with_retry`] for the bounded retry.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    async fn title(&mut self) -> Result<String>;

    /// Rendered HTML of the current document.
    async fn content(&mut self) -> Result<String>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;

    /// HTTP status of the last document navigation, when the engine reports it.
    async fn response_status(&mut self) -> Result<Option<u16>>;

    async fn capture_session(&mut self) -> Result<SessionState>;

    /// Inject cookies and local storage. Call before the first protected navigation.
    async fn restore_session(&mut self, state: &SessionState) -> Result<()>;

    /// Move to `mode`, keeping the session and the current page. May tear the
    /// underlying browser down and relaunch it.
    async fn switch_mode(&mut self, mode: BrowserMode) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    async fn is_login_page(&mut self) -> Result<bool> {
        let title = self.title().await?;
        let url = self.current_url().await?;
        Ok(looks_like_login(&title, &url))
    }
}

/// Opens browsers in a given mode.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, mode: BrowserMode) -> Result<Box<dyn BrowserDriver>>;
}

pub fn looks_like_login(title: &str, url: &str) -> bool {
    let url = url.to_lowercase();
    title.trim_start().starts_with(LOGIN_TITLE_PREFIX) || url.contains("/login") || url.contains("sign-in")
}

/// Navigate, retrying transient failures (timeouts, detached frames) per `policy`.
pub async fn navigate_with_retry(
    browser: &mut dyn BrowserDriver,
    url: &str,
    policy: &RetryPolicy,
) -> Result<()> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match browser.navigate(url).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("Navigation attempt {}/{} failed: {}", attempt, attempts, e);
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
