use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// One past occurrence of a group meeting, as scraped from its event page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub url: String,
    pub name: String,
    pub date: String,
    pub time: String,
    pub attendees: u32,
    pub host: Option<String>,
    pub location: Option<String>,
    pub details: Option<String>,
    pub cancelled: bool,
}

static EVENT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([^/]+)/events/(\d+)(?:/|$)").unwrap());

/// Identity of an event: the numeric id and the canonical URL it is embedded in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventLink {
    pub id: String,
    pub url: String,
    pub group: String,
}

impl EventLink {
    /// Resolve `href` against `base` and reduce it to the canonical
    /// `scheme://host/<group>/events/<id>/` form. Query strings, fragments and
    /// trailing sub-pages (`/attendees/`, `/comments/`) are dropped.
    pub fn parse(href: &str, base: &Url) -> Option<Self> {
        let joined = base.join(href.trim()).ok()?;
        if !matches!(joined.scheme(), "http" | "https") {
            return None;
        }
        let caps = EVENT_PATH.captures(joined.path())?;
        let group = caps.get(1)?.as_str().to_string();
        let id = caps.get(2)?.as_str().to_string();

        let host = joined.host_str()?;
        let authority = match joined.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let url = format!("{}://{}/{}/events/{}/", joined.scheme(), authority, group, id);

        Some(Self { id, url, group })
    }

    pub fn belongs_to(&self, group: &str) -> bool {
        self.group.eq_ignore_ascii_case(group)
    }
}

/// How many events a run should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(usize),
    All,
}

impl Limit {
    pub fn reached(&self, collected: usize) -> bool {
        match self {
            Limit::Count(n) => collected >= *n,
            Limit::All => false,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Limit::Count(n) => Some(*n),
            Limit::All => None,
        }
    }
}

impl FromStr for Limit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Limit::All);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("max events must be at least 1".to_string()),
            Ok(n) => Ok(Limit::Count(n)),
            Err(_) => Err(format!("expected a number or 'all', got '{s}'")),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Count(n) => write!(f, "{n}"),
            Limit::All => f.write_str("all"),
        }
    }
}
