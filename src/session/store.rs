use crate::error::{Result, ScraperError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// A single browser cookie as captured from the authenticated page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Persisted authentication material: cookies plus the site's local storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<SessionCookie>,
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
    /// Origin the local storage entries belong to.
    #[serde(default)]
    pub origin: String,
    pub saved_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(cookies: Vec<SessionCookie>, storage: BTreeMap<String, String>, origin: impl Into<String>) -> Self {
        Self {
            cookies,
            storage,
            origin: origin.into(),
            saved_at: Utc::now(),
        }
    }

    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.is_valid_at(Utc::now(), ttl)
    }

    /// A session is usable while strictly younger than `ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.saved_at) < ttl
    }
}

/// Load/save contract for session material. `load` never fails: a missing,
/// unreadable or expired session is reported as `None`.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<SessionState>;

    /// Persist `state`, stamping `saved_at` with the current time.
    fn save(&self, state: SessionState) -> Result<SessionState>;
}

/// JSON file on disk, overwritten atomically via a sibling temp file.
pub struct FileSessionStore {
    path: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { path: path.into(), ttl }
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Option<SessionState> {
        match self.read_at(now) {
            Ok(state) => Some(state),
            Err(e) => {
                info!("{}; login required", e);
                None
            }
        }
    }

    /// Like [`load_at`](Self::load_at) but says why no session is available.
    pub fn read_at(&self, now: DateTime<Utc>) -> Result<SessionState> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            debug!("No session file at {}: {}", self.path.display(), e);
            ScraperError::SessionAbsent
        })?;

        let state: SessionState = serde_json::from_str(&content).map_err(|e| {
            warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
            ScraperError::SessionAbsent
        })?;

        if !state.is_valid_at(now, self.ttl) {
            debug!(
                "Stored session from {} is older than {} days",
                state.saved_at.format("%Y-%m-%d %H:%M"),
                self.ttl.num_days()
            );
            return Err(ScraperError::SessionExpired);
        }

        Ok(state)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<SessionState> {
        self.load_at(Utc::now())
    }

    fn save(&self, mut state: SessionState) -> Result<SessionState> {
        state.saved_at = Utc::now();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!("Saved session ({} cookies) to {}", state.cookies.len(), self.path.display());
        Ok(state)
    }
}

/// In-process store, used where no session should touch the filesystem.
pub struct MemorySessionStore {
    state: Mutex<Option<SessionState>>,
    saves: Mutex<usize>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(None),
            saves: Mutex::new(0),
            ttl,
        }
    }

    /// Seed the store with `state` exactly as given, `saved_at` included.
    pub fn with_state(state: SessionState, ttl: Duration) -> Self {
        let store = Self::new(ttl);
        *store.state.lock().unwrap() = Some(state);
        store
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<SessionState> {
        self.state
            .lock()
            .unwrap()
            .clone()
            .filter(|s| s.is_valid(self.ttl))
    }

    fn save(&self, mut state: SessionState) -> Result<SessionState> {
        state.saved_at = Utc::now();
        *self.state.lock().unwrap() = Some(state.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(state)
    }
}
