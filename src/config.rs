use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE, DEFAULT_SESSION_TTL_DAYS, MEETUP_BASE_URL, SESSION_FILE_NAME,
};
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level scraper configuration. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub session_ttl_days: i64,
    pub paths: PathsConfig,
    pub browser: BrowserSettings,
    pub harvest: HarvestSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub browser_state_dir: PathBuf,
    pub events_dir: PathBuf,
    /// Overrides `browser_state_dir/session.json` when set.
    pub session_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub navigation_timeout_ms: u64,
    /// Pause after a page reports loaded, letting client-side rendering finish.
    pub settle_ms: u64,
    pub navigation_retries: u32,
    pub retry_backoff_ms: u64,
    pub chrome_executable: Option<PathBuf>,
    pub launch_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub initial_wait_ms: u64,
    pub scroll_settle_ms: u64,
    pub idle_rounds_limit: u32,
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub level: String,
    pub file_logging: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: MEETUP_BASE_URL.to_string(),
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
            paths: PathsConfig::default(),
            browser: BrowserSettings::default(),
            harvest: HarvestSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            browser_state_dir: PathBuf::from("browser_state"),
            events_dir: PathBuf::from("events"),
            session_file: None,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            settle_ms: 2_000,
            navigation_retries: 2,
            retry_backoff_ms: 1_000,
            chrome_executable: None,
            launch_args: vec![
                "--no-first-run".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--no-sandbox".to_string(),
                "--disable-extensions".to_string(),
                "--user-agent=Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string(),
            ],
        }
    }
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            initial_wait_ms: 3_000,
            scroll_settle_ms: 2_000,
            idle_rounds_limit: 3,
            max_rounds: 200,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.navigation_retries.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl HarvestSettings {
    pub fn initial_wait(&self) -> Duration {
        Duration::from_millis(self.initial_wait_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

/// Bounded retry for transient navigation failures. `attempts` counts the
/// first try; the wait before attempt `n + 1` is `backoff * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl ScraperConfig {
    /// Load configuration from `path`, or from `$MEETUP_SCRAPER_CONFIG`, or from
    /// `meetup_scraper.toml` in the working directory. A missing default file
    /// yields the built-in defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let config_path = match explicit {
            Some(p) => p,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&config_content)?;
        debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ScraperConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.browser.navigation_timeout_ms == 0 {
            return Err(ScraperError::Config("browser.navigation_timeout_ms must be positive".into()));
        }
        if self.harvest.max_rounds == 0 {
            return Err(ScraperError::Config("harvest.max_rounds must be positive".into()));
        }
        if self.harvest.idle_rounds_limit == 0 {
            return Err(ScraperError::Config("harvest.idle_rounds_limit must be positive".into()));
        }
        if self.session_ttl_days <= 0 {
            return Err(ScraperError::Config("session_ttl_days must be positive".into()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ScraperError::Config(format!("invalid base_url '{}': {}", self.base_url, e)))?;
        Ok(())
    }

    pub fn session_file(&self) -> PathBuf {
        self.paths
            .session_file
            .clone()
            .unwrap_or_else(|| self.paths.browser_state_dir.join(SESSION_FILE_NAME))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_ttl_days)
    }
}
