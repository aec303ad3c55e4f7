use crate::browser::{BrowserDriver, BrowserLauncher, BrowserMode};
use crate::config::ScraperConfig;
use crate::constants::{past_events_url, DEFAULT_MAX_EVENTS};
use crate::error::{Result, ScraperError};
use crate::extract::{EventExtractor, FailedEvent};
use crate::harvest::{StopReason, UrlHarvester};
use crate::output::{CsvEventWriter, EventSink, JsonEventWriter};
use crate::session::{ConfirmationSignal, LoginFlow, LoginOutcome, SessionStore};
use crate::types::{Event, Limit};
use std::path::PathBuf;
use tracing::{info, instrument, warn};
use url::Url;

/// What a single run should do, as chosen on the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub group: String,
    pub limit: Limit,
    pub csv: bool,
    pub json: bool,
    pub skip_cancelled: bool,
    /// Keep the browser visible after login instead of going headless.
    pub show_browser: bool,
}

impl RunOptions {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            limit: Limit::Count(DEFAULT_MAX_EVENTS),
            csv: true,
            json: true,
            skip_cancelled: false,
            show_browser: false,
        }
    }

    /// Checks that need no browser. Runs before anything is launched.
    pub fn validate(&self) -> Result<()> {
        if !self.csv && !self.json {
            return Err(ScraperError::NoOutputFormatSelected);
        }
        let group = self.group.trim();
        if group.is_empty() || group.contains('/') {
            return Err(ScraperError::Config(format!(
                "group must be a single URL segment such as 'python-seattle', got '{}'",
                self.group
            )));
        }
        Ok(())
    }
}

/// Result of a complete run.
#[derive(Debug)]
pub struct PipelineResult {
    pub group: String,
    pub login: LoginOutcome,
    pub harvested: usize,
    pub stop: StopReason,
    /// Records written, in harvest order.
    pub events: Vec<Event>,
    pub skipped_cancelled: usize,
    pub failures: Vec<FailedEvent>,
    pub json_files: Vec<PathBuf>,
    pub csv_file: Option<PathBuf>,
    pub events_dir: PathBuf,
}

/// Login, harvest, extract and write, in that order, over one browser.
pub struct Pipeline<'a> {
    config: &'a ScraperConfig,
    store: &'a dyn SessionStore,
    launcher: &'a dyn BrowserLauncher,
    signal: &'a dyn ConfirmationSignal,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a ScraperConfig,
        store: &'a dyn SessionStore,
        launcher: &'a dyn BrowserLauncher,
        signal: &'a dyn ConfirmationSignal,
    ) -> Self {
        Self {
            config,
            store,
            launcher,
            signal,
        }
    }

    #[instrument(skip(self, options), fields(group = %options.group))]
    pub async fn run(&self, options: &RunOptions) -> Result<PipelineResult> {
        options.validate()?;
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| ScraperError::Config(format!("invalid base_url '{}': {}", self.config.base_url, e)))?;
        let listing_url = past_events_url(&self.config.base_url, options.group.trim());

        info!("🚀 Scraping past events for '{}' (max: {})", options.group, options.limit);

        let working_mode = if options.show_browser {
            BrowserMode::Visible
        } else {
            BrowserMode::Headless
        };
        let session = LoginFlow::new(
            self.store,
            self.launcher,
            self.signal,
            self.config.browser.retry_policy(),
        )
        .with_working_mode(working_mode)
        .establish(&listing_url)
        .await?;

        let mut browser = session.browser;
        let result = self
            .scrape(browser.as_mut(), options, &base, &listing_url, session.outcome)
            .await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        result
    }

    async fn scrape(
        &self,
        browser: &mut dyn BrowserDriver,
        options: &RunOptions,
        base: &Url,
        listing_url: &str,
        login: LoginOutcome,
    ) -> Result<PipelineResult> {
        let group = options.group.trim();
        let retry = self.config.browser.retry_policy();
        let events_dir = self.config.paths.events_dir.clone();

        // Step 1: collect event URLs
        let harvester = UrlHarvester::new(self.config.harvest.clone(), retry, base.clone(), group);
        let harvest = harvester.harvest(browser, listing_url, options.limit).await?;

        // Step 2: visit each event, saving JSON as soon as a record exists
        info!("🔧 Extracting {} events...", harvest.urls.len());
        let extractor = EventExtractor::new(retry, base.clone());
        let mut json_writer = options.json.then(|| JsonEventWriter::new(&events_dir));
        let mut write_failures = Vec::new();

        let report = extractor
            .extract_all(browser, &harvest.urls, |_, event| {
                if options.skip_cancelled && event.cancelled {
                    return;
                }
                if let Some(writer) = json_writer.as_mut() {
                    if let Err(e) = writer.record(event) {
                        warn!("Failed to save event {}: {}", event.id, e);
                        write_failures.push(FailedEvent {
                            url: event.url.clone(),
                            reason: format!("could not write JSON: {e}"),
                        });
                    }
                }
            })
            .await;

        let mut failures = report.failures;
        let mut events = Vec::with_capacity(report.events.len());
        let mut skipped_cancelled = 0;
        for event in report.events {
            if options.skip_cancelled && event.cancelled {
                skipped_cancelled += 1;
            } else if !write_failures.iter().any(|f: &FailedEvent| f.url == event.url) {
                events.push(event);
            }
        }
        // An event whose JSON could not be written counts as failed, not saved.
        failures.extend(write_failures);
        if skipped_cancelled > 0 {
            info!("Skipped {} cancelled events", skipped_cancelled);
        }

        // Step 3: aggregate CSV
        let json_files = match json_writer.as_mut() {
            Some(writer) => {
                writer.finish()?;
                writer.written().to_vec()
            }
            None => Vec::new(),
        };
        let csv_file = if options.csv {
            let mut writer = CsvEventWriter::in_dir(&events_dir);
            for event in &events {
                writer.record(event)?;
            }
            writer.finish()?
        } else {
            None
        };

        Ok(PipelineResult {
            group: group.to_string(),
            login,
            harvested: harvest.urls.len(),
            stop: harvest.stop,
            events,
            skipped_cancelled,
            failures,
            json_files,
            csv_file,
            events_dir,
        })
    }
}
