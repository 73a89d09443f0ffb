// src/services/adapters/wordpress.rs

//! WordPress "The Events Calendar" (TEC) REST adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use super::{EventAdapter, lenient, value_text};
use crate::error::{AppError, Result};
use crate::models::{Config, RawEvent, TecEvent, TecVenue, WordPressConfig};
use crate::utils::http::{PageFetcher, polite_pause};
use crate::utils::{clean_html, origin};

/// Events API URL on the host of `site_url`.
fn api_url(site_url: &str, settings: &WordPressConfig) -> Result<Url> {
    let origin = origin(site_url)
        .ok_or_else(|| AppError::adapter("wordpress_tec", format!("no origin for {site_url}")))?;
    Ok(Url::parse(&origin)?.join(&settings.api_path)?)
}

/// Whether the host of `site_url` serves a TEC events payload.
///
/// Only a 2xx JSON object carrying an `events` key counts.
pub async fn probe_tec_api(
    fetcher: &dyn PageFetcher,
    site_url: &str,
    settings: &WordPressConfig,
    timeout: Duration,
) -> bool {
    let Ok(url) = api_url(site_url, settings) else {
        return false;
    };
    match fetcher.fetch(url.as_str(), timeout).await {
        Ok(page) if page.is_success() => serde_json::from_str::<Value>(page.text())
            .map(|data| data.get("events").is_some())
            .unwrap_or(false),
        Ok(page) => {
            log::debug!("TEC probe {} answered {}", url, page.status);
            false
        }
        Err(e) => {
            log::debug!("TEC probe {} failed: {}", url, e);
            false
        }
    }
}

/// `venue` is an object, or `[]` when the event has none.
fn lenient_venue<'de, D>(deserializer: D) -> std::result::Result<Option<TecVenue>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(venue @ Value::Object(_)) = value.as_ref() else {
        return Ok(None);
    };
    let state = ["state", "province", "stateprovince"]
        .iter()
        .find_map(|key| value_text(venue.get(*key)));
    Ok(Some(TecVenue {
        name: value_text(venue.get("venue")).and_then(|v| clean_html(Some(&v))),
        address: value_text(venue.get("address")),
        city: value_text(venue.get("city")),
        state,
        zip: value_text(venue.get("zip")),
        country: value_text(venue.get("country")),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ApiEvent {
    #[serde(default, deserialize_with = "lenient::text")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    start_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_venue")]
    venue: Option<TecVenue>,
    #[serde(default, deserialize_with = "lenient::tags")]
    categories: Vec<String>,
}

fn parse_event(row: Value) -> Option<TecEvent> {
    match ApiEvent::deserialize(&row) {
        Ok(e) => Some(TecEvent {
            title: clean_html(e.title.as_deref()),
            url: e.url,
            start_date: e.start_date,
            end_date: e.end_date,
            description: clean_html(e.description.as_deref()),
            venue: e.venue,
            categories: e.categories,
            raw: row,
        }),
        Err(e) => {
            log::debug!("Skipping malformed TEC event: {}", e);
            None
        }
    }
}

/// Paginates `/wp-json/tribe/events/v1/events`.
pub struct WordPressTecAdapter {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
}

impl WordPressTecAdapter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl EventAdapter for WordPressTecAdapter {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>> {
        let settings = &self.config.wordpress;
        let timeout = self.config.crawler.timeout();
        let api = api_url(calendar_root, settings)?;

        let mut events = Vec::new();
        for page in 1..=settings.max_pages {
            if page > 1 {
                polite_pause(settings.page_delay()).await;
            }

            let mut url = api.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &settings.per_page.to_string())
                .append_pair("page", &page.to_string());

            let response = self.fetcher.fetch(url.as_str(), timeout).await?;
            if response.status != 200 {
                log::debug!("TEC page {} answered {}, done", page, response.status);
                break;
            }
            let data: Value = serde_json::from_str(response.text())?;
            let rows = match data.get("events") {
                Some(Value::Array(rows)) if !rows.is_empty() => rows.clone(),
                _ => break,
            };
            events.extend(rows.into_iter().filter_map(parse_event).map(RawEvent::WordPressTec));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::ScriptedFetcher;
    use serde_json::json;

    const API: &str = "https://lib.org/wp-json/tribe/events/v1/events";

    fn quiet_config(max_pages: u32) -> Arc<Config> {
        let mut config = Config::default();
        config.wordpress.page_delay_ms = 0;
        config.wordpress.max_pages = max_pages;
        Arc::new(config)
    }

    fn page_one() -> String {
        json!({
            "events": [
                {
                    "title": "Adult Book Club &#8211; January",
                    "url": "https://lib.org/event/book-club/",
                    "start_date": "2026-01-12 18:30:00",
                    "end_date": "2026-01-12 19:30:00",
                    "description": "<p>Discuss <em>Piranesi</em>.</p>",
                    "venue": {"venue": "Reading Room", "address": "12 Elm St",
                              "city": "Media", "province": "PA", "zip": "19063"},
                    "categories": [{"name": "Adults", "slug": "adults"}]
                },
                {"title": "Yoga", "url": "https://lib.org/event/yoga/", "venue": []}
            ],
            "total": 2
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_probe_requires_events_key() {
        let settings = WordPressConfig::default();
        let t = Duration::from_secs(1);

        let fetcher = ScriptedFetcher::new().page(API, 200, r#"{"events": []}"#);
        assert!(probe_tec_api(&fetcher, "https://lib.org/events/", &settings, t).await);

        let fetcher = ScriptedFetcher::new().page(API, 200, r#"{"code": "rest_no_route"}"#);
        assert!(!probe_tec_api(&fetcher, "https://lib.org/events/", &settings, t).await);

        let fetcher = ScriptedFetcher::new().page(API, 404, "Not Found");
        assert!(!probe_tec_api(&fetcher, "https://lib.org/events/", &settings, t).await);
    }

    #[tokio::test]
    async fn test_paginates_until_empty_list() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(&format!("{API}?per_page=50&page=1"), 200, page_one())
                .page(&format!("{API}?per_page=50&page=2"), 200, r#"{"events": []}"#),
        );
        let adapter = WordPressTecAdapter::new(quiet_config(10), fetcher.clone());

        let events = adapter.extract("https://lib.org/events/").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(fetcher.fetched().len(), 2);

        let RawEvent::WordPressTec(first) = &events[0] else {
            panic!("expected a TEC event");
        };
        assert_eq!(first.title.as_deref(), Some("Adult Book Club – January"));
        assert_eq!(first.description.as_deref(), Some("Discuss Piranesi ."));
        let venue = first.venue.as_ref().unwrap();
        assert_eq!(venue.name.as_deref(), Some("Reading Room"));
        assert_eq!(venue.state.as_deref(), Some("PA"));
        assert_eq!(first.categories, vec!["Adults"]);

        let RawEvent::WordPressTec(second) = &events[1] else {
            panic!("expected a TEC event");
        };
        assert_eq!(second.venue, None);
    }

    #[tokio::test]
    async fn test_non_200_ends_pagination_without_error() {
        let fetcher = Arc::new(ScriptedFetcher::new().page(
            &format!("{API}?per_page=50&page=1"),
            404,
            "",
        ));
        let adapter = WordPressTecAdapter::new(quiet_config(10), fetcher);
        assert!(adapter.extract("https://lib.org/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_pages_bounds_requests() {
        let fetcher = Arc::new(ScriptedFetcher::new().prefix(API, 200, page_one()));
        let adapter = WordPressTecAdapter::new(quiet_config(2), fetcher.clone());

        let events = adapter.extract("https://lib.org/").await.unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(fetcher.fetched().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_spaced_by_page_delay() {
        let fetcher = Arc::new(ScriptedFetcher::new().prefix(API, 200, page_one()));
        let mut config = Config::default();
        config.wordpress.max_pages = 3;
        let delay = config.wordpress.page_delay();
        let adapter = WordPressTecAdapter::new(Arc::new(config), fetcher.clone());

        let started = tokio::time::Instant::now();
        adapter.extract("https://lib.org/").await.unwrap();

        assert_eq!(fetcher.fetched().len(), 3);
        assert!(started.elapsed() >= delay * 2);
        let at: Vec<_> = fetcher.timeline().into_iter().map(|(at, _)| at).collect();
        assert!(at.windows(2).all(|w| w[1] - w[0] >= delay));
    }
}
