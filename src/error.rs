use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Stored session has expired")]
    SessionExpired,

    #[error("No stored session")]
    SessionAbsent,

    #[error("Login could not be verified: still on the login page. Log in again and check your credentials.")]
    LoginVerificationFailed,

    #[error("Page requires login: {url}")]
    LoginRequired { url: String },

    #[error("Navigation timed out: {url}")]
    NavigationTimeout { url: String },

    #[error("Page failed to load: {url}: {message}")]
    PageLoad { url: String, message: String },

    #[error("Group '{group}' could not be reached (HTTP {status})")]
    GroupUnreachable { group: String, status: u16 },

    #[error("Not an event URL: {0}")]
    InvalidEventUrl(String),

    #[error("Both CSV and JSON output are disabled; enable at least one output format")]
    NoOutputFormatSelected,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScraperError {
    /// Navigation failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScraperError::NavigationTimeout { .. } | ScraperError::PageLoad { .. }
        )
    }
}

impl From<chromiumoxide::error::CdpError> for ScraperError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScraperError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
