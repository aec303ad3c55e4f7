//! Persisting event records: one pretty JSON file per event under a dated
//! directory, plus one aggregated CSV for the whole run.

use crate::constants::{EVENTS_CSV_FILE, EVENT_DATA_FILE};
use crate::error::Result;
use crate::types::Event;
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CSV_HEADER: [&str; 10] = [
    "id",
    "url",
    "name",
    "date",
    "time",
    "attendees",
    "host",
    "location",
    "details",
    "cancelled",
];

static DISPLAY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]{3})[A-Z]*\.?\s+(\d{1,2}),\s+(\d{4})").unwrap());
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

fn month_number(abbr: &str) -> Option<u32> {
    let month = match abbr {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// "WED, JUL 16, 2025, 10:00 AM BST" -> "2025-07-16". Already-ISO input passes
/// through; anything unparseable becomes `today`.
pub fn iso_date(display: &str, today: NaiveDate) -> String {
    parse_display_date(display)
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

fn parse_display_date(display: &str) -> Option<NaiveDate> {
    let trimmed = display.trim();
    if let Some(Ok(date)) = trimmed.get(..10).map(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d")) {
        return Some(date);
    }
    let upper = trimmed.to_uppercase();
    let caps = DISPLAY_DATE.captures(&upper)?;
    let month = month_number(&caps[1])?;
    let day = caps[2].parse().ok()?;
    let year = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Strip anything but word characters, spaces and hyphens, then collapse
/// whitespace/hyphen runs into a single hyphen.
pub fn sanitize_filename(name: &str) -> String {
    let safe = UNSAFE_CHARS.replace_all(name, "");
    SEPARATOR_RUNS.replace_all(safe.trim(), "-").into_owned()
}

/// `<iso-date>_<id>`, the per-event directory name.
pub fn event_dir_name(event: &Event, today: NaiveDate) -> String {
    format!("{}_{}", iso_date(&event.date, today), sanitize_filename(&event.id))
}

/// Destination for extracted records.
pub trait EventSink {
    fn record(&mut self, event: &Event) -> Result<()>;

    /// Flush whatever the sink buffered. Returns the path written, if any.
    fn finish(&mut self) -> Result<Option<PathBuf>>;
}

/// Writes `<root>/<iso>_<id>/data.json` as soon as each record arrives.
/// Re-recording the same event overwrites the same file.
pub struct JsonEventWriter {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl JsonEventWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn write_event(&self, event: &Event) -> Result<PathBuf> {
        let dir = self.root.join(event_dir_name(event, Local::now().date_naive()));
        fs::create_dir_all(&dir)?;
        let path = dir.join(EVENT_DATA_FILE);
        fs::write(&path, serde_json::to_string_pretty(event)?)?;
        debug!("💾 Saved {}", path.display());
        Ok(path)
    }
}

impl EventSink for JsonEventWriter {
    fn record(&mut self, event: &Event) -> Result<()> {
        let path = self.write_event(event)?;
        if !self.written.contains(&path) {
            self.written.push(path);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<PathBuf>> {
        info!("💾 Wrote {} event files under {}", self.written.len(), self.root.display());
        Ok(None)
    }
}

/// Buffers records and writes one CSV with a header row on `finish`.
pub struct CsvEventWriter {
    path: PathBuf,
    rows: Vec<Event>,
}

impl CsvEventWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
        }
    }

    /// `<events_dir>/events.csv`
    pub fn in_dir(events_dir: &Path) -> Self {
        Self::new(events_dir.join(EVENTS_CSV_FILE))
    }
}

pub fn write_csv(path: &Path, events: &[Event]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Header written by hand so an empty run still gets one.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    Ok(())
}

impl EventSink for CsvEventWriter {
    fn record(&mut self, event: &Event) -> Result<()> {
        self.rows.push(event.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<PathBuf>> {
        write_csv(&self.path, &self.rows)?;
        info!("💾 Saved {} events to {}", self.rows.len(), self.path.display());
        Ok(Some(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
    }

    fn event(id: &str, date: &str) -> Event {
        Event {
            id: id.to_string(),
            url: format!("https://www.meetup.com/rust-club/events/{id}/"),
            name: "Rust, Night".to_string(),
            date: date.to_string(),
            time: "7:00 PM".to_string(),
            attendees: 12,
            host: Some("Ferris".to_string()),
            location: None,
            details: Some("Line one\nLine \"two\"".to_string()),
            cancelled: false,
        }
    }

    #[test]
    fn test_iso_date_formats() {
        assert_eq!(iso_date("WED, JUL 16, 2025, 10:00 AM BST", today()), "2025-07-16");
        assert_eq!(iso_date("Thursday, May 8, 2025", today()), "2025-05-08");
        assert_eq!(iso_date("Sept. 3, 2024", today()), "2024-09-03");
        assert_eq!(iso_date("2024-11-05", today()), "2024-11-05");
        assert_eq!(iso_date("", today()), "2026-01-02");
        assert_eq!(iso_date("FEB 30, 2025", today()), "2026-01-02");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("  Rust: Night / Q&A  "), "Rust-Night-QA");
        assert_eq!(sanitize_filename("305"), "305");
        assert_eq!(sanitize_filename("a -- b"), "a-b");
    }

    #[test]
    fn test_json_writer_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut writer = JsonEventWriter::new(tmp.path());
        let e = event("305", "WED, JUL 16, 2025");

        writer.record(&e).unwrap();
        writer.record(&e).unwrap();
        assert_eq!(writer.written().len(), 1);

        let path = tmp.path().join("2025-07-16_305").join("data.json");
        assert_eq!(writer.written()[0], path);
        let back: Event = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_csv_has_header_and_quotes_fields() {
        let tmp = TempDir::new().unwrap();
        let mut writer = CsvEventWriter::in_dir(tmp.path());
        writer.record(&event("1", "JAN 1, 2025")).unwrap();
        writer.record(&event("2", "JAN 2, 2025")).unwrap();
        let path = writer.finish().unwrap().unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CSV_HEADER);

        let rows: Vec<Event> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, "2");
        assert_eq!(rows[0].name, "Rust, Night");
        assert_eq!(rows[0].details.as_deref(), Some("Line one\nLine \"two\""));
    }

    #[test]
    fn test_empty_csv_still_has_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("events.csv");
        write_csv(&path, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim_end(),
            "id,url,name,date,time,attendees,host,location,details,cancelled"
        );
    }
}
