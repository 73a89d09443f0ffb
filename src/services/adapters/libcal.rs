// src/services/adapters/libcal.rs

//! Springshare LibCal adapter.
//!
//! The calendar page embeds a numeric calendar id in its scripts; events are
//! then paged out of `/ajax/calendar/list` on the same host.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{EventAdapter, lenient};
use crate::error::{AppError, Result};
use crate::models::{Config, LibCalEvent, RawEvent};
use crate::utils::http::{PageFetcher, fetch_required, polite_pause};
use crate::utils::{clean_html, origin, parse_selector};

static CALENDAR_ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"baseCalendarId\s*:\s*(\d+)").expect("valid base calendar id regex"),
        Regex::new(r"calendarId\s*=\s*(\d+)").expect("valid calendar id regex"),
    ]
});

/// Find the LibCal calendar id in a page's inline scripts.
///
/// `baseCalendarId: N` takes precedence over `calendarId = N`.
pub fn extract_calendar_id(html: &str) -> Option<u64> {
    let document = Html::parse_document(html);
    let scripts: Vec<String> = match parse_selector("script") {
        Ok(selector) => document
            .select(&selector)
            .map(|s| s.text().collect::<String>())
            .collect(),
        Err(_) => vec![html.to_string()],
    };

    CALENDAR_ID_PATTERNS.iter().find_map(|pattern| {
        scripts.iter().find_map(|script| {
            pattern
                .captures(script)
                .and_then(|caps| caps.get(1))
                .and_then(|id| id.as_str().parse().ok())
        })
    })
}

/// One row of the `results` array.
#[derive(Debug, Default, Deserialize)]
struct ListRow {
    #[serde(default, deserialize_with = "lenient::text")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    start: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    end: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    startdt: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    enddt: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    campus: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    shortdesc: Option<String>,
    #[serde(default, deserialize_with = "lenient::tags")]
    categories_arr: Vec<String>,
    #[serde(default, deserialize_with = "lenient::tags")]
    audiences: Vec<String>,
}

impl ListRow {
    fn into_event(self, raw: Value) -> LibCalEvent {
        LibCalEvent {
            title: self.title,
            url: self.url,
            date: self.date,
            start_timestamp: self.startdt.or_else(|| self.start.clone()),
            end_timestamp: self.enddt.or_else(|| self.end.clone()),
            start: self.start,
            end: self.end,
            campus: self.campus,
            location: self.location,
            description: clean_html(self.shortdesc.as_deref()),
            categories: self.categories_arr,
            audiences: self.audiences,
            raw,
        }
    }
}

fn parse_row(row: Value) -> Option<LibCalEvent> {
    match ListRow::deserialize(&row) {
        Ok(parsed) => Some(parsed.into_event(row)),
        Err(e) => {
            log::debug!("Skipping malformed LibCal row: {}", e);
            None
        }
    }
}

/// Paginates the LibCal list endpoint of one calendar.
pub struct LibCalAdapter {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
}

impl LibCalAdapter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    fn list_url(&self, origin: &str, calendar_id: u64, page: u32) -> Result<String> {
        let settings = &self.config.libcal;
        let mut url = Url::parse(origin)?.join(&settings.list_path)?;
        url.query_pairs_mut()
            .append_pair("c", &calendar_id.to_string())
            .append_pair("date", "0000-00-00")
            .append_pair("perpage", &settings.per_page.to_string())
            .append_pair("page", &page.to_string());
        Ok(url.to_string())
    }

    async fn fetch_rows(&self, url: &str, timeout: Duration) -> Result<Vec<Value>> {
        let page = fetch_required(self.fetcher.as_ref(), url, timeout).await?;
        let data: Value = serde_json::from_str(page.text())?;
        Ok(match data.get("results") {
            Some(Value::Array(rows)) => rows.clone(),
            _ => Vec::new(),
        })
    }
}

#[async_trait]
impl EventAdapter for LibCalAdapter {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>> {
        let timeout = self.config.crawler.timeout();
        let root = fetch_required(self.fetcher.as_ref(), calendar_root, timeout).await?;

        let Some(calendar_id) = extract_calendar_id(root.text()) else {
            log::debug!("No LibCal calendar id on {}", calendar_root);
            return Ok(Vec::new());
        };
        let origin = origin(&root.final_url)
            .or_else(|| origin(calendar_root))
            .ok_or_else(|| AppError::adapter("libcal", format!("no origin for {calendar_root}")))?;
        log::info!("LibCal calendar {} on {}", calendar_id, origin);

        let settings = &self.config.libcal;
        let mut events = Vec::new();
        for page in 1..=settings.max_pages {
            if page > 1 {
                polite_pause(settings.page_delay()).await;
            }

            let url = self.list_url(&origin, calendar_id, page)?;
            let rows = self.fetch_rows(&url, timeout).await?;
            if rows.is_empty() {
                log::debug!("LibCal page {} is empty, done", page);
                break;
            }
            events.extend(rows.into_iter().filter_map(parse_row).map(RawEvent::LibCal));

            if page == settings.max_pages {
                log::warn!(
                    "LibCal calendar {} still paging at the {}-page cap, stopping",
                    calendar_id,
                    page
                );
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::ScriptedFetcher;
    use serde_json::json;

    const ROOT: &str = "https://ccls.libcal.com/calendar";
    const LIST: &str = "https://ccls.libcal.com/ajax/calendar/list?c=13410&date=0000-00-00&perpage=50&page=";

    fn root_page() -> &'static str {
        r#"<html><head><script>
            var springyPage = { baseCalendarId: 13410, lang: "en" };
        </script></head><body><div id="cal"></div></body></html>"#
    }

    fn two_events() -> String {
        json!({
            "results": [
                {
                    "title": "Toddler Story Time",
                    "url": "https://ccls.libcal.com/event/101",
                    "date": "Monday, January 5, 2026",
                    "start": "10:00am",
                    "end": "10:30am",
                    "startdt": "2026-01-05 10:00:00",
                    "enddt": "2026-01-05 10:30:00",
                    "campus": "Honey Brook",
                    "location": "Community Room",
                    "shortdesc": "<p>Songs &amp; stories</p>",
                    "categories_arr": [{"id": 1, "name": "Storytime"}],
                    "audiences": [{"id": 9, "name": "Toddlers"}]
                },
                {
                    "title": "Chess Club",
                    "url": "https://ccls.libcal.com/event/102",
                    "campus": "",
                    "location": "Main",
                    "categories_arr": [],
                    "audiences": false
                }
            ]
        })
        .to_string()
    }

    fn config_with(max_pages: u32) -> Arc<Config> {
        let mut config = Config::default();
        config.libcal.page_delay_ms = 0;
        config.libcal.max_pages = max_pages;
        Arc::new(config)
    }

    #[test]
    fn test_extract_calendar_id_patterns() {
        assert_eq!(extract_calendar_id(root_page()), Some(13410));
        assert_eq!(
            extract_calendar_id("<script>window.calendarId = 77;</script>"),
            Some(77)
        );
        assert_eq!(
            extract_calendar_id("<script>calendarId = 1; x = {baseCalendarId: 2}</script>"),
            Some(2)
        );
        assert_eq!(extract_calendar_id("<p>calendarId = 5</p>"), None);
    }

    #[tokio::test]
    async fn test_stops_at_first_empty_page() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(ROOT, 200, root_page())
                .page(&format!("{LIST}1"), 200, two_events())
                .page(&format!("{LIST}2"), 200, r#"{"results": []}"#),
        );
        let adapter = LibCalAdapter::new(config_with(200), fetcher.clone());

        let events = adapter.extract(ROOT).await.unwrap();

        assert_eq!(events.len(), 2);
        assert!(!fetcher.fetched().contains(&format!("{LIST}3")));
        assert_eq!(fetcher.fetched().len(), 3);

        let RawEvent::LibCal(first) = &events[0] else {
            panic!("expected a LibCal event");
        };
        assert_eq!(first.title.as_deref(), Some("Toddler Story Time"));
        assert_eq!(first.description.as_deref(), Some("Songs & stories"));
        assert_eq!(first.start_timestamp.as_deref(), Some("2026-01-05 10:00:00"));
        assert_eq!(first.categories, vec!["Storytime"]);
        assert_eq!(first.audiences, vec!["Toddlers"]);

        let RawEvent::LibCal(second) = &events[1] else {
            panic!("expected a LibCal event");
        };
        assert_eq!(second.campus, None);
        assert_eq!(second.location.as_deref(), Some("Main"));
        assert!(second.audiences.is_empty());
        assert_eq!(second.start_timestamp, None);
    }

    #[tokio::test]
    async fn test_endless_endpoint_stops_at_page_cap() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(ROOT, 200, root_page())
                .prefix(LIST, 200, two_events()),
        );
        let adapter = LibCalAdapter::new(config_with(3), fetcher.clone());

        let events = adapter.extract(ROOT).await.unwrap();

        assert_eq!(events.len(), 6);
        let list_requests = fetcher
            .fetched()
            .iter()
            .filter(|u| u.starts_with(LIST))
            .count();
        assert_eq!(list_requests, 3);
    }

    #[tokio::test]
    async fn test_page_without_id_yields_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::new().page(ROOT, 200, "<html>No scripts</html>"));
        let adapter = LibCalAdapter::new(config_with(200), fetcher.clone());

        assert!(adapter.extract(ROOT).await.unwrap().is_empty());
        assert_eq!(fetcher.fetched(), vec![ROOT.to_string()]);
    }

    #[tokio::test]
    async fn test_list_error_is_raised() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(ROOT, 200, root_page())
                .page(&format!("{LIST}1"), 502, "bad gateway"),
        );
        let adapter = LibCalAdapter::new(config_with(200), fetcher);

        let err = adapter.extract(ROOT).await.unwrap_err();
        assert!(matches!(err, AppError::HttpStatus { status: 502, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_spaced_by_page_delay() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(ROOT, 200, root_page())
                .prefix(LIST, 200, two_events()),
        );
        let mut config = Config::default();
        config.libcal.max_pages = 3;
        let delay = config.libcal.page_delay();
        let adapter = LibCalAdapter::new(Arc::new(config), fetcher.clone());

        adapter.extract(ROOT).await.unwrap();

        let pages: Vec<_> = fetcher
            .timeline()
            .into_iter()
            .filter(|(_, line)| line.contains("/ajax/calendar/list"))
            .map(|(at, _)| at)
            .collect();
        assert_eq!(pages.len(), 3);
        assert!(pages[2] - pages[0] >= delay * 2);
        assert!(pages.windows(2).all(|w| w[1] - w[0] >= delay));
    }
}
