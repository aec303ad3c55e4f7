use super::{BrowserDriver, BrowserLauncher, BrowserMode};
use crate::config::BrowserSettings;
use crate::error::{Result, ScraperError};
use crate::session::{SessionCookie, SessionState};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Handler, Page};
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const BLANK_PAGE: &str = "about:blank";

const READ_STORAGE_JS: &str = r#"
(() => {
    const out = {};
    for (let i = 0; i < window.localStorage.length; i++) {
        const key = window.localStorage.key(i);
        out[key] = window.localStorage.getItem(key);
    }
    return out;
})()
"#;

const NAVIGATION_STATUS_JS: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : null;
})()
"#;

/// A Chromium instance driven over CDP with one working tab.
///
/// The CDP handler runs on its own task; it is aborted on `close` and on drop so
/// no exit path leaves it polling a dead connection. Dropping the `Browser`
/// kills the child process.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    mode: BrowserMode,
    settings: BrowserSettings,
    closed: bool,
}

impl ChromeSession {
    pub async fn open(mode: BrowserMode, settings: BrowserSettings) -> Result<Self> {
        let (browser, page, handler_task) = launch(mode, &settings).await?;
        Ok(Self {
            browser,
            page,
            handler_task,
            mode,
            settings,
            closed: false,
        })
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close reported: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Waiting for browser exit failed: {}", e);
        }
        self.handler_task.abort();
    }

    fn classify(url: &str, err: CdpError) -> ScraperError {
        match err {
            CdpError::Timeout => ScraperError::NavigationTimeout { url: url.to_string() },
            other => ScraperError::PageLoad {
                url: url.to_string(),
                message: other.to_string(),
            },
        }
    }
}

async fn launch(mode: BrowserMode, settings: &BrowserSettings) -> Result<(Browser, Page, JoinHandle<()>)> {
    let mut builder = BrowserConfig::builder()
        .args(settings.launch_args.clone())
        .request_timeout(settings.navigation_timeout());
    if mode == BrowserMode::Visible {
        builder = builder.with_head();
    }
    if let Some(exe) = &settings.chrome_executable {
        builder = builder.chrome_executable(exe);
    }
    let config = builder.build().map_err(ScraperError::Browser)?;

    info!("Launching {} browser", mode);
    let (browser, handler) = Browser::launch(config).await?;
    let handler_task = spawn_handler_task(handler);
    let page = browser.new_page(BLANK_PAGE).await?;
    Ok((browser, page, handler_task))
}

fn spawn_handler_task(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler event error: {}", e);
            }
        }
    })
}

fn to_cookie_param(cookie: &SessionCookie) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder.build().map_err(ScraperError::Browser)
}

#[async_trait]
impl BrowserDriver for ChromeSession {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let timeout = self.settings.navigation_timeout();
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(ScraperError::NavigationTimeout { url: url.to_string() }),
            Ok(Err(e)) => return Err(Self::classify(url, e)),
            Ok(Ok(_)) => {}
        }
        tokio::time::sleep(self.settings.settle()).await;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.evaluate("window.scrollTo(0, document.body.scrollHeight); true")
            .await
            .map(|_| ())
    }

    async fn response_status(&mut self) -> Result<Option<u16>> {
        let value = self.evaluate(NAVIGATION_STATUS_JS).await?;
        Ok(value.as_u64().and_then(|s| u16::try_from(s).ok()))
    }

    async fn capture_session(&mut self) -> Result<SessionState> {
        let cookies = self
            .page
            .get_cookies()
            .await?
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: Some(c.expires).filter(|e| *e > 0.0),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect::<Vec<_>>();

        let storage: BTreeMap<String, String> =
            serde_json::from_value(self.evaluate(READ_STORAGE_JS).await?).unwrap_or_default();
        let origin = self
            .evaluate("window.location.origin")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();

        debug!("Captured {} cookies and {} storage entries", cookies.len(), storage.len());
        Ok(SessionState::new(cookies, storage, origin))
    }

    async fn restore_session(&mut self, state: &SessionState) -> Result<()> {
        let params = state
            .cookies
            .iter()
            .map(to_cookie_param)
            .collect::<Result<Vec<_>>>()?;
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }

        // Local storage is per-origin, so it can only be written from a page on that origin.
        if !state.storage.is_empty() && state.origin.starts_with("http") {
            self.navigate(&state.origin).await?;
            let entries = serde_json::to_string(&state.storage)?;
            let script = format!(
                "(() => {{ const entries = {entries}; for (const [k, v] of Object.entries(entries)) {{ window.localStorage.setItem(k, v); }} return true; }})()"
            );
            self.evaluate(&script).await?;
        }

        debug!(
            "Restored {} cookies and {} storage entries",
            state.cookies.len(),
            state.storage.len()
        );
        Ok(())
    }

    async fn switch_mode(&mut self, mode: BrowserMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }

        let state = self.capture_session().await?;
        let url = self.current_url().await?;

        info!("Switching browser from {} to {}", self.mode, mode);
        self.shutdown().await;

        let (browser, page, handler_task) = launch(mode, &self.settings).await?;
        self.browser = browser;
        self.page = page;
        self.handler_task = handler_task;
        self.mode = mode;

        self.restore_session(&state).await?;
        if url.starts_with("http") {
            self.navigate(&url).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            info!("Closing browser");
            self.shutdown().await;
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Browser dropped without close; aborting CDP handler");
        }
        self.handler_task.abort();
    }
}

/// Launches [`ChromeSession`]s with the configured settings.
pub struct ChromeLauncher {
    settings: BrowserSettings,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, mode: BrowserMode) -> Result<Box<dyn BrowserDriver>> {
        let session = ChromeSession::open(mode, self.settings.clone()).await?;
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_param_conversion() {
        let cookie = SessionCookie {
            name: "MEETUP_MEMBER".into(),
            value: "id=1".into(),
            domain: ".meetup.com".into(),
            path: "/".into(),
            expires: Some(1_900_000_000.0),
            secure: true,
            http_only: true,
        };
        let param = to_cookie_param(&cookie).unwrap();
        assert_eq!(param.name, "MEETUP_MEMBER");
        assert_eq!(param.domain.as_deref(), Some(".meetup.com"));
        assert_eq!(param.secure, Some(true));
    }
}
