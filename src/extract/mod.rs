pub mod fields;
pub mod selectors;

use crate::browser::{navigate_with_retry, BrowserDriver};
use crate::config::RetryPolicy;
use crate::error::{Result, ScraperError};
use crate::types::{Event, EventLink};
use scraper::Html;
use tracing::{debug, error, info, instrument};
use url::Url;

/// An event URL that produced no record, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEvent {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub events: Vec<Event>,
    pub failures: Vec<FailedEvent>,
}

impl ExtractionReport {
    pub fn succeeded(&self) -> usize {
        self.events.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Assemble an `Event` from a parsed event page. Identity comes from the link;
/// every other field is best-effort.
pub fn build_event(link: &EventLink, doc: &Html) -> Event {
    let name = fields::name(doc);
    let date = fields::date(doc);
    let time = fields::time(doc);
    let attendees = fields::attendees(doc);
    let host = fields::host(doc);
    let location = fields::location(doc);
    let details = fields::details(doc);
    let cancelled = fields::cancelled(doc);

    let defaulted: Vec<&str> = [
        ("name", name.defaulted),
        ("date", date.defaulted),
        ("time", time.defaulted),
        ("attendees", attendees.defaulted),
        ("host", host.defaulted),
        ("location", location.defaulted),
        ("details", details.defaulted),
    ]
    .into_iter()
    .filter_map(|(field, defaulted)| defaulted.then_some(field))
    .collect();
    if !defaulted.is_empty() {
        debug!(event_id = %link.id, "Defaulted fields: {}", defaulted.join(", "));
    }

    Event {
        id: link.id.clone(),
        url: link.url.clone(),
        name: name.value,
        date: date.value,
        time: time.value,
        attendees: attendees.value,
        host: host.value,
        location: location.value,
        details: details.value,
        cancelled: cancelled.value,
    }
}

/// Visits event pages one at a time and turns them into records.
pub struct EventExtractor {
    retry: RetryPolicy,
    base: Url,
}

impl EventExtractor {
    pub fn new(retry: RetryPolicy, base: Url) -> Self {
        Self { retry, base }
    }

    #[instrument(skip(self, browser))]
    pub async fn extract_one(&self, browser: &mut dyn BrowserDriver, url: &str) -> Result<Event> {
        let link = EventLink::parse(url, &self.base)
            .ok_or_else(|| ScraperError::InvalidEventUrl(url.to_string()))?;

        navigate_with_retry(browser, &link.url, &self.retry).await?;
        if browser.is_login_page().await? {
            return Err(ScraperError::LoginRequired { url: link.url });
        }

        let html = browser.content().await?;
        let doc = Html::parse_document(&html);
        Ok(build_event(&link, &doc))
    }

    /// Extract every URL in order. A failing URL is logged and recorded in the
    /// report; it never stops the batch. `on_event` sees each record as soon as
    /// it is built, with its 1-based position.
    pub async fn extract_all<F>(
        &self,
        browser: &mut dyn BrowserDriver,
        urls: &[String],
        mut on_event: F,
    ) -> ExtractionReport
    where
        F: FnMut(usize, &Event),
    {
        let mut report = ExtractionReport::default();
        let total = urls.len();

        for (i, url) in urls.iter().enumerate() {
            match self.extract_one(browser, url).await {
                Ok(event) => {
                    let short: String = event.name.chars().take(50).collect();
                    info!("   🔍 [{}/{}] {} (id {}, {})", i + 1, total, short, event.id, event.date);
                    on_event(i + 1, &event);
                    report.events.push(event);
                }
                Err(e) => {
                    error!("   ⚠️  [{}/{}] Skipping {}: {}", i + 1, total, url, e);
                    report.failures.push(FailedEvent {
                        url: url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "✅ Extracted {} events ({} failed)",
            report.succeeded(),
            report.failed()
        );
        report
    }
}
