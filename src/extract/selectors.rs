//! CSS selectors for Meetup event pages, most specific first. Meetup's markup
//! drifts; when a field starts coming back empty, this is the file to update.

pub const NAME: &[&str] = &["main h1", "h1"];

pub const NAME_META: &[&str] = &[r#"meta[property="og:title"]"#, r#"meta[name="twitter:title"]"#];

pub const WHEN: &[&str] = &[
    r#"[data-testid="event-when-display"] time"#,
    "#event-info time",
    "time[datetime]",
    "time",
];

pub const HOST: &[&str] = &[
    r#"[data-event-label="hosted-by"] span.font-semibold"#,
    r#"[data-testid="event-host"]"#,
    r#"[data-event-label="hosted-by"]"#,
    ".event-host",
];

pub const LOCATION: &[&str] = &[
    r#"#event-info > div > div:nth-child(1) > div.flex.flex-col > div > div.overflow-hidden.pl-4.md\:pl-4\.5.lg\:pl-5"#,
    r#"[data-testid="event-location"]"#,
    r#"[data-testid="venue-info"]"#,
    ".venueDisplay",
    ".event-location",
    ".venue-info",
    r#"[class*="location"]"#,
    r#"[class*="venue"]"#,
];

pub const DETAILS_PRIMARY: &[&str] = &["#event-details > div.break-words"];

pub const DETAILS_FALLBACK: &[&str] = &[
    "#event-details",
    r#"[data-testid="event-description"]"#,
    ".event-description",
    ".description",
    r#"[class*="description"]"#,
    "#details",
    ".event-details",
];

pub const ATTENDEES: &[&str] = &[
    "#attendees",
    r#"[data-testid="attendees-count"]"#,
    r#"[data-testid="attendees"]"#,
    ".attendees",
];

pub const CANCELLED_BADGE: &[&str] = &[
    r#"[data-testid="cancelled-badge"]"#,
    r#"[data-event-status="cancelled"]"#,
    r#"[data-event-status="CANCELLED"]"#,
    ".cancelled-badge",
];

/// Elements whose own text is checked for a cancellation notice.
pub const CANCELLED_TEXT_CARRIERS: &[&str] = &["h1", "h2", "h3", "p", "span", "div", "strong", "b"];
