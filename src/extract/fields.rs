//! One independent extractor per `Event` field. Each reads the parsed page and
//! returns a value plus whether it fell back to the default; none can fail.

use super::selectors;
use crate::dom;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted<T> {
    pub value: T,
    pub defaulted: bool,
}

impl<T> Extracted<T> {
    pub fn found(value: T) -> Self {
        Self { value, defaulted: false }
    }
}

impl<T: Default> Extracted<T> {
    pub fn missing() -> Self {
        Self {
            value: T::default(),
            defaulted: true,
        }
    }
}

static DISPLAY_WHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?\b\d{4})(?:,\s*|\s+)(\d{1,2}:\d{2}.*)$").unwrap());

static ATTENDEES_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)attendees?\s*\(\s*(\d{1,3}(?:[,.\x{a0}\x{202f} ]\d{3})+|\d+)\s*\)").unwrap());

static ATTENDEES_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:[,.\x{a0}\x{202f} ]\d{3})+|\d+)\s*(?:attendees?|members?|people|going|attended|went)\b")
        .unwrap()
});

static HOSTED_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)hosted by\s*([^\n]+)").unwrap());

const CANCELLED_NOTICES: &[&str] = &[
    "cancelled",
    "canceled",
    "event cancelled",
    "event canceled",
    "this event has been cancelled",
    "this event has been canceled",
];

const ONLINE_MARKER: &str = "online event";

fn first_match<'a>(doc: &'a Html, list: &[&str]) -> impl Iterator<Item = ElementRef<'a>> {
    dom::compile(list)
        .into_iter()
        .flat_map(|selector| doc.select(&selector).collect::<Vec<_>>())
}

fn first_text<F>(doc: &Html, list: &[&str], render: F, min_len: usize) -> Option<String>
where
    F: Fn(ElementRef<'_>) -> String,
{
    first_match(doc, list)
        .map(render)
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty() && t.chars().count() >= min_len)
}

fn meta_content(doc: &Html, list: &[&str]) -> Option<String> {
    first_match(doc, list)
        .filter_map(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

pub fn name(doc: &Html) -> Extracted<String> {
    if let Some(title) = first_text(doc, selectors::NAME, dom::inline_text, 1) {
        return Extracted::found(title);
    }
    match meta_content(doc, selectors::NAME_META) {
        // og:title carries a " | Meetup" suffix
        Some(title) => Extracted::found(title.split(" | ").next().unwrap_or(&title).trim().to_string()),
        None => Extracted::missing(),
    }
}

/// Split a rendered "when" display into its date and time parts.
fn when_parts(doc: &Html) -> Option<(String, String)> {
    let element = first_match(doc, selectors::WHEN).next()?;
    let parts: Vec<String> = element
        .text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect();

    match parts.as_slice() {
        [] => {
            let stamp = element.value().attr("datetime")?;
            let (date, time) = stamp.split_once('T').unwrap_or((stamp, ""));
            Some((date.to_string(), time.chars().take(5).collect()))
        }
        [single] => Some(split_display_when(single)),
        [date, rest @ ..] => Some((date.clone(), rest.join(" "))),
    }
}

/// "WED, JUL 16, 2025, 10:00 AM BST" -> ("WED, JUL 16, 2025", "10:00 AM BST").
pub fn split_display_when(text: &str) -> (String, String) {
    match DISPLAY_WHEN.captures(text.trim()) {
        Some(caps) => (caps[1].trim().to_string(), caps[2].trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

pub fn date(doc: &Html) -> Extracted<String> {
    match when_parts(doc) {
        Some((date, _)) if !date.is_empty() => Extracted::found(date),
        _ => Extracted::missing(),
    }
}

pub fn time(doc: &Html) -> Extracted<String> {
    match when_parts(doc) {
        Some((_, time)) if !time.is_empty() => Extracted::found(time),
        _ => Extracted::missing(),
    }
}

/// Count from display text, ignoring grouping separators ("1,234", "1.234", "1 234").
pub fn parse_count(text: &str) -> Option<u32> {
    heading_count(text).or_else(|| {
        let caps = ATTENDEES_COUNT.captures(text)?;
        let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    })
}

fn heading_count(text: &str) -> Option<u32> {
    let caps = ATTENDEES_HEADING.captures(text)?;
    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub fn attendees(doc: &Html) -> Extracted<u32> {
    let from_section = first_match(doc, selectors::ATTENDEES).find_map(|e| parse_count(&dom::inline_text(e)));
    // Outside the attendee section only the "Attendees (N)" heading counts;
    // loose "N members" text there usually describes the group.
    match from_section.or_else(|| heading_count(&dom::visible_text(doc))) {
        Some(count) => Extracted::found(count),
        None => Extracted::missing(),
    }
}

pub fn host(doc: &Html) -> Extracted<Option<String>> {
    let strip = |t: String| match t.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("hosted by") => t[9..].trim().to_string(),
        _ => t,
    };

    if let Some(host) = first_text(doc, selectors::HOST, dom::inline_text, 1).map(strip) {
        if !host.is_empty() {
            return Extracted::found(Some(host));
        }
    }
    let text = dom::visible_text(doc);
    match HOSTED_BY.captures(&text) {
        Some(caps) => Extracted::found(Some(caps[1].trim().to_string())),
        None => Extracted::missing(),
    }
}

pub fn location(doc: &Html) -> Extracted<Option<String>> {
    let render = |e: ElementRef<'_>| dom::block_text(e).replace('\n', ", ");
    if let Some(location) = first_text(doc, selectors::LOCATION, render, 6) {
        return Extracted::found(Some(location));
    }
    if dom::visible_text(doc).to_lowercase().contains(ONLINE_MARKER) {
        return Extracted::found(Some("Online event".to_string()));
    }
    Extracted::missing()
}

pub fn details(doc: &Html) -> Extracted<Option<String>> {
    if let Some(details) = first_text(doc, selectors::DETAILS_PRIMARY, dom::block_text, 1) {
        return Extracted::found(Some(details));
    }
    // Fallback containers are broad; short text there is usually a label.
    match first_text(doc, selectors::DETAILS_FALLBACK, dom::block_text, 51) {
        Some(details) => Extracted::found(Some(details)),
        None => Extracted::missing(),
    }
}

pub fn cancelled(doc: &Html) -> Extracted<bool> {
    if first_match(doc, selectors::CANCELLED_BADGE).next().is_some() {
        return Extracted::found(true);
    }
    let notice = first_match(doc, selectors::CANCELLED_TEXT_CARRIERS)
        .map(|e| dom::own_text(e).to_lowercase())
        .any(|t| CANCELLED_NOTICES.contains(&t.trim_end_matches(|c: char| c == '.' || c == '!').trim()));
    if notice {
        Extracted::found(true)
    } else {
        Extracted::missing()
    }
}
