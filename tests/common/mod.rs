#![allow(dead_code)]

use async_trait::async_trait;
use meetup_scraper::browser::{BrowserDriver, BrowserLauncher, BrowserMode};
use meetup_scraper::config::ScraperConfig;
use meetup_scraper::error::{Result, ScraperError};
use meetup_scraper::session::{ConfirmationSignal, SessionCookie, SessionState};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const BASE: &str = "https://www.meetup.com";
pub const GROUP: &str = "rust-club";
const SESSION_COOKIE: &str = "MEETUP_MEMBER";
const GOOD_TOKEN: &str = "id=42";

pub fn listing_url() -> String {
    format!("{BASE}/{GROUP}/events/past/")
}

pub fn event_url(id: u64) -> String {
    format!("{BASE}/{GROUP}/events/{id}/")
}

/// Config with every wait at zero so tests never sleep.
pub fn test_config(root: &Path) -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.paths.events_dir = root.join("events");
    config.paths.browser_state_dir = root.join("browser_state");
    config.browser.settle_ms = 0;
    config.browser.retry_backoff_ms = 0;
    config.browser.navigation_retries = 2;
    config.harvest.initial_wait_ms = 0;
    config.harvest.scroll_settle_ms = 0;
    config.harvest.idle_rounds_limit = 3;
    config.harvest.max_rounds = 25;
    config.logging.file_logging = false;
    config
}

pub fn session(token: &str, age: chrono::Duration) -> SessionState {
    let mut state = SessionState::new(
        vec![SessionCookie {
            name: SESSION_COOKIE.into(),
            value: token.into(),
            domain: ".meetup.com".into(),
            path: "/".into(),
            expires: None,
            secure: true,
            http_only: true,
        }],
        BTreeMap::new(),
        BASE,
    );
    state.saved_at = chrono::Utc::now() - age;
    state
}

pub fn valid_session(age: chrono::Duration) -> SessionState {
    session(GOOD_TOKEN, age)
}

pub fn event_page(name: &str, date: &str, attendees: u32) -> String {
    format!(
        r#"<html><head><title>{name} | Meetup</title></head><body>
            <main><h1>{name}</h1></main>
            <div data-testid="event-when-display"><time>{date}<br>7:00 PM to 9:00 PM PDT</time></div>
            <div data-testid="event-host">Hosted by Ferris</div>
            <div data-testid="event-location"><p>Hack Space</p><p>12 Pine St, Seattle</p></div>
            <div id="event-details"><div class="break-words"><p>Talks and pizza.</p></div></div>
            <section id="attendees"><h2>Attendees ({attendees})</h2></section>
        </body></html>"#
    )
}

/// Everything the fake site knows and everything the fakes observed.
#[derive(Default)]
pub struct SiteState {
    /// Event ids in listing order.
    pub listing: Vec<u64>,
    /// Cards rendered per scroll step.
    pub page_size: usize,
    /// Keep inventing new events on every scroll.
    pub endless: bool,
    pub listing_status: Option<u16>,
    pub listing_html_override: Option<String>,
    pub pages: HashMap<String, String>,
    /// URLs whose every navigation times out.
    pub failing: HashSet<String>,
    /// URLs that time out this many more times before loading.
    pub flaky: HashMap<String, u32>,
    /// URLs that load this many times, then time out for good.
    pub outage_after: HashMap<String, usize>,
    /// How long each successful navigation waits for the page to settle.
    pub settle: Duration,

    pub requires_login: bool,
    pub logged_in: bool,
    /// Confirming does not actually log the operator in.
    pub login_never_succeeds: bool,

    pub revealed: usize,
    pub launches: Vec<BrowserMode>,
    pub mode_switches: Vec<BrowserMode>,
    pub navigations: Vec<String>,
    pub restored: usize,
    pub closes: usize,
}

#[derive(Clone)]
pub struct FakeSite(Arc<Mutex<SiteState>>);

impl FakeSite {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SiteState {
            page_size: 4,
            listing_status: Some(200),
            ..SiteState::default()
        })))
    }

    /// A group with `count` past events, each with a detail page.
    pub fn with_events(count: u64) -> Self {
        let site = Self::new();
        {
            let mut state = site.state();
            for i in 0..count {
                let id = 1000 + i;
                state.listing.push(id);
                state.pages.insert(
                    event_url(id),
                    event_page(&format!("Meetup #{id}"), "Thursday, May 8, 2025", 10 + i as u32),
                );
            }
        }
        site
    }

    pub fn state(&self) -> MutexGuard<'_, SiteState> {
        self.0.lock().unwrap()
    }

    pub fn launcher(&self) -> FakeLauncher {
        FakeLauncher { site: self.clone() }
    }

    pub fn login_signal(&self) -> LoginOnConfirm {
        LoginOnConfirm {
            site: self.clone(),
            waits: AtomicUsize::new(0),
        }
    }

    fn render_listing(state: &SiteState) -> String {
        if let Some(html) = &state.listing_html_override {
            return html.clone();
        }
        let shown = state.page_size * state.revealed.max(1);
        let ids: Vec<u64> = if state.endless {
            (0..shown as u64).map(|i| 5000 + i).collect()
        } else {
            state.listing.iter().copied().take(shown).collect()
        };
        let cards: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div id="past-event-card-ep-{id}"><a href="/{GROUP}/events/{id}/?eventOrigin=group_past_events">Meetup #{id}</a></div>"#
                )
            })
            .collect();
        format!(r#"<html><head><title>Past events | Rust Club</title></head><body><div id="list">{cards}</div></body></html>"#)
    }
}

pub struct FakeBrowser {
    site: FakeSite,
    mode: BrowserMode,
    current: String,
}

impl FakeBrowser {
    fn on_login_page(&self) -> bool {
        self.current.contains("/login")
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    fn mode(&self) -> BrowserMode {
        self.mode
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let settle = {
            let mut state = self.site.state();
            state.navigations.push(url.to_string());

            if state.failing.contains(url) {
                return Err(ScraperError::NavigationTimeout { url: url.to_string() });
            }
            if let Some(remaining) = state.outage_after.get_mut(url) {
                if *remaining == 0 {
                    return Err(ScraperError::NavigationTimeout { url: url.to_string() });
                }
                *remaining -= 1;
            }
            if let Some(remaining) = state.flaky.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ScraperError::PageLoad {
                        url: url.to_string(),
                        message: "frame detached".into(),
                    });
                }
            }

            if state.requires_login && !state.logged_in {
                self.current = format!("{BASE}/login/?returnUri={url}");
            } else {
                self.current = url.to_string();
                if url == listing_url() {
                    state.revealed = 1;
                }
            }
            state.settle
        };
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn title(&mut self) -> Result<String> {
        if self.on_login_page() {
            return Ok("Login to Meetup | Meetup".to_string());
        }
        Ok("Meetup".to_string())
    }

    async fn content(&mut self) -> Result<String> {
        let state = self.site.state();
        if self.on_login_page() {
            return Ok("<html><body><form><button>Log in</button></form></body></html>".to_string());
        }
        if self.current == listing_url() {
            return Ok(FakeSite::render_listing(&state));
        }
        Ok(state
            .pages
            .get(&self.current)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        if self.current == listing_url() {
            self.site.state().revealed += 1;
        }
        Ok(())
    }

    async fn response_status(&mut self) -> Result<Option<u16>> {
        if self.current == listing_url() {
            return Ok(self.site.state().listing_status);
        }
        Ok(Some(200))
    }

    async fn capture_session(&mut self) -> Result<SessionState> {
        let token = if self.site.state().logged_in { GOOD_TOKEN } else { "anonymous" };
        Ok(session(token, chrono::Duration::zero()))
    }

    async fn restore_session(&mut self, state: &SessionState) -> Result<()> {
        let mut site = self.site.state();
        site.restored += 1;
        if state.cookies.iter().any(|c| c.name == SESSION_COOKIE && c.value == GOOD_TOKEN) {
            site.logged_in = true;
        }
        Ok(())
    }

    async fn switch_mode(&mut self, mode: BrowserMode) -> Result<()> {
        self.site.state().mode_switches.push(mode);
        self.mode = mode;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.site.state().closes += 1;
        Ok(())
    }
}

pub struct FakeLauncher {
    site: FakeSite,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, mode: BrowserMode) -> Result<Box<dyn BrowserDriver>> {
        self.site.state().launches.push(mode);
        Ok(Box::new(FakeBrowser {
            site: self.site.clone(),
            mode,
            current: "about:blank".to_string(),
        }))
    }
}

/// Stands in for the operator: pressing ENTER logs the site in, unless the
/// site is set to reject the login.
pub struct LoginOnConfirm {
    site: FakeSite,
    waits: AtomicUsize,
}

impl LoginOnConfirm {
    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationSignal for LoginOnConfirm {
    async fn wait(&self, _prompt: &str) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        let mut state = self.site.state();
        if !state.login_never_succeeds {
            state.logged_in = true;
        }
        Ok(())
    }
}
