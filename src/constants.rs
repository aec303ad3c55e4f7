/// Site and file-layout constants shared across the scraper.

pub const MEETUP_BASE_URL: &str = "https://www.meetup.com";

/// Page title prefix Meetup uses for its sign-in wall.
pub const LOGIN_TITLE_PREFIX: &str = "Login to Meetup";

pub const SESSION_FILE_NAME: &str = "session.json";
pub const EVENT_DATA_FILE: &str = "data.json";
pub const EVENTS_CSV_FILE: &str = "events.csv";

pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;
pub const DEFAULT_MAX_EVENTS: usize = 10;

pub const DEFAULT_CONFIG_FILE: &str = "meetup_scraper.toml";
pub const CONFIG_PATH_ENV: &str = "MEETUP_SCRAPER_CONFIG";

/// Build the past-events listing URL for a group.
pub fn past_events_url(base_url: &str, group: &str) -> String {
    format!("{}/{}/events/past/", base_url.trim_end_matches('/'), group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_events_url() {
        assert_eq!(
            past_events_url("https://www.meetup.com/", "python-seattle"),
            "https://www.meetup.com/python-seattle/events/past/"
        );
    }
}
