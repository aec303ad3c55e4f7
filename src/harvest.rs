//! Lazy-load URL harvesting: scan the rendered past-events list, scroll to
//! reveal more cards, and repeat until the target is met or the list stops
//! growing.

use crate::browser::{navigate_with_retry, BrowserDriver};
use crate::config::{HarvestSettings, RetryPolicy};
use crate::dom;
use crate::error::{Result, ScraperError};
use crate::types::{EventLink, Limit};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Event cards on the past-events page; the card itself may be the anchor.
const CARD_LINK_SELECTOR: &str =
    r#"a[id^="past-event-card-ep-"][href], [id^="past-event-card-ep-"] a[href]"#;
const ANY_LINK_SELECTOR: &str = "a[href]";

const EMPTY_LISTING_MARKERS: &[&str] = &["no past events", "no upcoming events", "no events"];
const LOGIN_MARKERS: &[&str] = &["log in", "sign in"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// Several consecutive rounds revealed nothing new.
    Exhausted,
    RoundCap,
    /// The page reports the group has no past events.
    EmptyListing,
}

/// Progress of one harvest: discovered URLs in order, plus round bookkeeping.
#[derive(Debug, Clone)]
pub struct HarvestCursor {
    urls: Vec<String>,
    seen: HashSet<String>,
    idle_rounds: u32,
    rounds: u32,
    target: Limit,
}

impl HarvestCursor {
    pub fn new(target: Limit) -> Self {
        Self {
            urls: Vec::new(),
            seen: HashSet::new(),
            idle_rounds: 0,
            rounds: 0,
            target,
        }
    }

    /// Record one scan round. Returns how many URLs were new.
    pub fn absorb<I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.rounds += 1;
        let mut added = 0;
        for url in urls {
            if self.seen.insert(url.clone()) {
                self.urls.push(url);
                added += 1;
            }
        }
        if added == 0 {
            self.idle_rounds += 1;
        } else {
            self.idle_rounds = 0;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn idle_rounds(&self) -> u32 {
        self.idle_rounds
    }

    pub fn stop_reason(&self, settings: &HarvestSettings) -> Option<StopReason> {
        if self.target.reached(self.urls.len()) {
            Some(StopReason::TargetReached)
        } else if self.idle_rounds >= settings.idle_rounds_limit {
            Some(StopReason::Exhausted)
        } else if self.rounds >= settings.max_rounds {
            Some(StopReason::RoundCap)
        } else {
            None
        }
    }

    /// Discovered URLs in discovery order, cut to the target.
    pub fn into_urls(mut self) -> Vec<String> {
        if let Some(n) = self.target.as_count() {
            self.urls.truncate(n);
        }
        self.urls
    }
}

/// Per-round feedback for long harvests. Called after every scan with the
/// running total and how many URLs that round added.
pub trait HarvestProgress: Send + Sync {
    fn on_round(&self, total: usize, added: usize);
}

/// Default reporter: one `info!` line per round.
pub struct LogProgress;

impl HarvestProgress for LogProgress {
    fn on_round(&self, total: usize, added: usize) {
        info!("   Found {} event links (+{} this round)", total, added);
    }
}

#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub urls: Vec<String>,
    pub rounds: u32,
    pub stop: StopReason,
}

/// Canonical event URLs for `group` found in `html`, in document order.
/// Cards are preferred; if the page has none, any matching anchor counts.
pub fn scan_event_links(html: &str, base: &Url, group: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = collect_links(&document, CARD_LINK_SELECTOR, base, group);
    if links.is_empty() {
        links = collect_links(&document, ANY_LINK_SELECTOR, base, group);
    }
    links
}

fn collect_links(document: &Html, selector: &str, base: &Url, group: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| EventLink::parse(href, base))
        .filter(|link| link.belongs_to(group))
        .map(|link| link.url)
        .collect()
}

/// Why a page with no event links is empty, if the page says so.
fn diagnose_empty(html: &str) -> Option<EmptyPage> {
    let text = dom::visible_text(&Html::parse_document(html)).to_lowercase();
    if EMPTY_LISTING_MARKERS.iter().any(|m| text.contains(m)) {
        Some(EmptyPage::NoEvents)
    } else if LOGIN_MARKERS.iter().any(|m| text.contains(m)) {
        Some(EmptyPage::LoginWall)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmptyPage {
    NoEvents,
    LoginWall,
}

pub struct UrlHarvester {
    settings: HarvestSettings,
    retry: RetryPolicy,
    base: Url,
    group: String,
    progress: Arc<dyn HarvestProgress>,
}

impl UrlHarvester {
    pub fn new(settings: HarvestSettings, retry: RetryPolicy, base: Url, group: impl Into<String>) -> Self {
        Self {
            settings,
            retry,
            base,
            group: group.into(),
            progress: Arc::new(LogProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn HarvestProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Open the listing at `listing_url` and collect up to `target` event URLs.
    /// Any navigation failure aborts: a partial list is not trustworthy.
    #[instrument(skip(self, browser), fields(group = %self.group))]
    pub async fn harvest(
        &self,
        browser: &mut dyn BrowserDriver,
        listing_url: &str,
        target: Limit,
    ) -> Result<HarvestOutcome> {
        info!("📜 Loading events (target: {})...", target);
        navigate_with_retry(browser, listing_url, &self.retry).await?;

        if let Some(status) = browser.response_status().await? {
            if status >= 400 {
                return Err(ScraperError::GroupUnreachable {
                    group: self.group.clone(),
                    status,
                });
            }
        }
        if browser.is_login_page().await? {
            return Err(ScraperError::LoginRequired {
                url: listing_url.to_string(),
            });
        }

        tokio::time::sleep(self.settings.initial_wait()).await;

        let mut cursor = HarvestCursor::new(target);
        let stop = loop {
            let html = browser.content().await?;
            let found = scan_event_links(&html, &self.base, &self.group);
            let added = cursor.absorb(found);
            self.progress.on_round(cursor.len(), added);

            if cursor.rounds() == 1 && cursor.is_empty() {
                match diagnose_empty(&html) {
                    Some(EmptyPage::NoEvents) => {
                        info!("   ℹ️  Page indicates no past events");
                        break StopReason::EmptyListing;
                    }
                    Some(EmptyPage::LoginWall) => {
                        let url = browser.current_url().await?;
                        warn!("   ⚠️  Page contains login content - authentication required!");
                        return Err(ScraperError::LoginRequired { url });
                    }
                    None => debug!("No event links on first scan; scrolling"),
                }
            }

            if let Some(reason) = cursor.stop_reason(&self.settings) {
                break reason;
            }

            browser.scroll_to_bottom().await?;
            tokio::time::sleep(self.settings.scroll_settle()).await;
        };

        let rounds = cursor.rounds();
        let urls = cursor.into_urls();
        info!("✅ Harvested {} event URLs in {} rounds ({:?})", urls.len(), rounds, stop);
        Ok(HarvestOutcome { urls, rounds, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.meetup.com/rust-club/events/past/").unwrap()
    }

    fn settings() -> HarvestSettings {
        HarvestSettings {
            initial_wait_ms: 0,
            scroll_settle_ms: 0,
            idle_rounds_limit: 3,
            max_rounds: 10,
        }
    }

    #[test]
    fn test_scan_prefers_cards_and_dedups_by_url() {
        let html = r#"
            <div id="past-event-card-ep-101"><a href="/rust-club/events/101/?eventOrigin=group_past_events">A</a></div>
            <a id="past-event-card-ep-102" href="https://www.meetup.com/rust-club/events/102/">B</a>
            <div id="past-event-card-ep-101-clone"><a href="/rust-club/events/101/">A again</a></div>
            <aside><a href="/other-group/events/999/">Similar event</a></aside>
        "#;
        let links = scan_event_links(html, &base(), "rust-club");
        assert_eq!(
            links,
            vec![
                "https://www.meetup.com/rust-club/events/101/",
                "https://www.meetup.com/rust-club/events/102/",
                "https://www.meetup.com/rust-club/events/101/",
            ]
        );

        let mut cursor = HarvestCursor::new(Limit::All);
        assert_eq!(cursor.absorb(links), 2);
    }

    #[test]
    fn test_scan_falls_back_to_any_event_anchor() {
        let html = r#"<ul><li><a href="/rust-club/events/7/">Seven</a></li><li><a href="/rust-club/about/">About</a></li></ul>"#;
        assert_eq!(
            scan_event_links(html, &base(), "rust-club"),
            vec!["https://www.meetup.com/rust-club/events/7/"]
        );
    }

    #[test]
    fn test_cursor_stops_at_target_and_truncates() {
        let mut cursor = HarvestCursor::new(Limit::Count(2));
        cursor.absorb(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(cursor.stop_reason(&settings()), Some(StopReason::TargetReached));
        assert_eq!(cursor.into_urls(), vec!["a", "b"]);
    }

    #[test]
    fn test_cursor_exhausts_after_idle_rounds() {
        let mut cursor = HarvestCursor::new(Limit::All);
        cursor.absorb(vec!["a".to_string()]);
        for _ in 0..2 {
            cursor.absorb(vec!["a".to_string()]);
            assert_eq!(cursor.stop_reason(&settings()), None);
        }
        cursor.absorb(Vec::new());
        assert_eq!(cursor.idle_rounds(), 3);
        assert_eq!(cursor.stop_reason(&settings()), Some(StopReason::Exhausted));
    }

    #[test]
    fn test_cursor_round_cap() {
        let mut cursor = HarvestCursor::new(Limit::All);
        for i in 0..10 {
            cursor.absorb(vec![format!("url-{i}")]);
        }
        assert_eq!(cursor.stop_reason(&settings()), Some(StopReason::RoundCap));
    }

    #[test]
    fn test_new_url_resets_idle_count() {
        let mut cursor = HarvestCursor::new(Limit::All);
        cursor.absorb(Vec::new());
        cursor.absorb(Vec::new());
        cursor.absorb(vec!["fresh".to_string()]);
        assert_eq!(cursor.idle_rounds(), 0);
    }

    #[test]
    fn test_diagnose_empty_page() {
        assert_eq!(
            diagnose_empty("<p>This group has no past events</p>"),
            Some(EmptyPage::NoEvents)
        );
        assert_eq!(
            diagnose_empty("<button>Log in</button>"),
            Some(EmptyPage::LoginWall)
        );
        assert_eq!(diagnose_empty("<div class='spinner'></div>"), None);
    }
}
