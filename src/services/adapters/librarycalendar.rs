// src/services/adapters/librarycalendar.rs

//! LibraryCalendar (Drupal / Communico style) adapter.
//!
//! Three hops: the calendar view links to daily feed pages, feed pages link
//! to event detail pages, and each detail page carries a JSON-LD `Event`
//! plus site-specific markup.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use super::{EventAdapter, value_text};
use crate::error::Result;
use crate::models::{Address, Config, Contact, LibraryCalendarEvent, RawEvent};
use crate::utils::http::{PageFetcher, fetch_required, polite_pause};
use crate::utils::{
    clean_html, collapse_whitespace, non_blank, parse_selector, resolve_http, resolve_url,
};

/// Whether a page shows LibraryCalendar markup or daily-feed links.
pub fn has_librarycalendar_markup(html: &str, feed_pattern: &str) -> bool {
    html.contains(feed_pattern) || html.contains("lc-event")
}

/// Links in `html` whose href contains `pattern`, resolved against `base`.
///
/// Order of first appearance is kept; duplicates are dropped.
fn matching_links(html: &str, base: &Url, pattern: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let anchor = parse_selector("a[href]")?;
    let mut seen = HashSet::new();
    Ok(document
        .select(&anchor)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains(pattern))
        .filter_map(|href| resolve_http(base, href))
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

struct DetailSelectors {
    jsonld: Selector,
    age_groups: Selector,
    date: Selector,
    time: Selector,
    contact_name: Selector,
    contact_email: Selector,
    contact_phone: Selector,
}

impl DetailSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            jsonld: parse_selector(r#"script[type="application/ld+json"]"#)?,
            age_groups: parse_selector(".lc-event__age-groups a")?,
            date: parse_selector(".lc-event-info-item--date")?,
            time: parse_selector(".lc-event-info-item--time")?,
            contact_name: parse_selector(".lc-event-contact-name")?,
            contact_email: parse_selector(".lc-event-contact-email a")?,
            contact_phone: parse_selector(".lc-event-contact-phone a")?,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().and_then(element_text)
}

/// Locate the `Event` node in a JSON-LD document.
///
/// Handles a bare object, an array of nodes, and an `@graph` container.
fn find_event(data: &Value) -> Option<&Value> {
    match data {
        Value::Array(nodes) => nodes.iter().find_map(find_event),
        Value::Object(map) => {
            if is_event_type(map.get("@type")) {
                return Some(data);
            }
            map.get("@graph").and_then(find_event)
        }
        _ => None,
    }
}

fn is_event_type(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(t)) => t.ends_with("Event"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|t| t.ends_with("Event"))),
        _ => false,
    }
}

fn first_of(value: Option<&Value>) -> Option<&Value> {
    match value? {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn parse_address(value: Option<&Value>) -> Option<Address> {
    let address = match first_of(value)? {
        Value::String(street) => Address {
            street: non_blank(Some(street)),
            ..Address::default()
        },
        obj @ Value::Object(_) => Address {
            street: value_text(obj.get("streetAddress")),
            city: value_text(obj.get("addressLocality")),
            state: value_text(obj.get("addressRegion")),
            zip: value_text(obj.get("postalCode")),
            country: value_text(obj.get("addressCountry"))
                .or_else(|| obj.get("addressCountry").and_then(|c| value_text(c.get("name")))),
        },
        _ => return None,
    };
    (!address.is_empty()).then_some(address)
}

/// Structured fields of a JSON-LD `Event` block.
#[derive(Debug, Default, PartialEq)]
struct JsonLdEvent {
    name: Option<String>,
    description: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    location_name: Option<String>,
    address: Option<Address>,
    organizer_name: Option<String>,
    organizer_url: Option<String>,
}

/// Parse one JSON-LD script body; `Ok(None)` when it holds no `Event`.
fn parse_jsonld_event(text: &str) -> Result<Option<JsonLdEvent>> {
    let data: Value = serde_json::from_str(text)?;
    let Some(event) = find_event(&data) else {
        return Ok(None);
    };

    let mut parsed = JsonLdEvent {
        name: clean_html(event.get("name").and_then(Value::as_str)),
        description: clean_html(event.get("description").and_then(Value::as_str)),
        start_date: value_text(event.get("startDate")),
        end_date: value_text(event.get("endDate")),
        ..JsonLdEvent::default()
    };

    match first_of(event.get("location")) {
        Some(Value::String(name)) => parsed.location_name = clean_html(Some(name)),
        Some(location @ Value::Object(_)) => {
            parsed.location_name = value_text(location.get("name"));
            parsed.address = parse_address(location.get("address"));
        }
        _ => {}
    }

    match first_of(event.get("organizer")) {
        Some(Value::String(name)) => parsed.organizer_name = clean_html(Some(name)),
        Some(organizer @ Value::Object(_)) => {
            parsed.organizer_name = value_text(organizer.get("name"));
            parsed.organizer_url = value_text(organizer.get("url"));
        }
        _ => {}
    }

    Ok(Some(parsed))
}

/// Parse an event detail page.
///
/// Missing or malformed JSON-LD leaves the structured fields empty; the
/// page markup is still read.
pub fn parse_detail(html: &str, page_url: &str) -> Result<LibraryCalendarEvent> {
    let selectors = DetailSelectors::new()?;
    let document = Html::parse_document(html);

    let jsonld = document
        .select(&selectors.jsonld)
        .map(|script| script.text().collect::<String>())
        .find_map(|text| match parse_jsonld_event(&text) {
            Ok(found) => found,
            Err(e) => {
                log::debug!("Unreadable JSON-LD on {}: {}", page_url, e);
                None
            }
        })
        .unwrap_or_else(|| {
            log::debug!("No JSON-LD Event on {}", page_url);
            JsonLdEvent::default()
        });

    let age_groups = document
        .select(&selectors.age_groups)
        .filter_map(element_text)
        .collect();

    let contact = Contact {
        name: first_text(&document, &selectors.contact_name).and_then(|name| {
            let name = name.strip_prefix("Name:").unwrap_or(&name).trim().to_string();
            (!name.is_empty()).then_some(name)
        }),
        email: first_text(&document, &selectors.contact_email),
        phone: first_text(&document, &selectors.contact_phone),
    };
    let has_contact = contact.name.is_some() || contact.email.is_some() || contact.phone.is_some();

    Ok(LibraryCalendarEvent {
        url: page_url.to_string(),
        name: jsonld.name,
        description: jsonld.description,
        start_date: jsonld.start_date,
        end_date: jsonld.end_date,
        location_name: jsonld.location_name,
        address: jsonld.address,
        organizer_name: jsonld.organizer_name,
        organizer_url: jsonld.organizer_url,
        age_groups,
        date_display: first_text(&document, &selectors.date),
        time_display: first_text(&document, &selectors.time),
        contact: has_contact.then_some(contact),
    })
}

/// Crawls calendar view → daily feeds → event detail pages.
pub struct LibraryCalendarAdapter {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
}

impl LibraryCalendarAdapter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// GET a page on a best-effort hop; failures are logged and skipped.
    async fn fetch_optional(&self, url: &str, timeout: Duration) -> Option<String> {
        match self.fetcher.fetch(url, timeout).await {
            Ok(page) if page.status < 400 => page.body,
            Ok(page) => {
                log::debug!("Skipping {} (HTTP {})", url, page.status);
                None
            }
            Err(e) => {
                log::debug!("Skipping {}: {}", url, e);
                None
            }
        }
    }

    async fn discover_feeds(&self, calendar_root: &str, timeout: Duration) -> Result<Vec<String>> {
        let settings = &self.config.librarycalendar;
        let root = fetch_required(self.fetcher.as_ref(), calendar_root, timeout).await?;
        let base = Url::parse(&root.final_url).or_else(|_| Url::parse(calendar_root))?;

        let feeds = matching_links(root.text(), &base, &settings.feed_pattern)?;
        if !feeds.is_empty() {
            return Ok(feeds);
        }

        for path in &settings.alternate_paths {
            let view = resolve_url(&base, path);
            log::debug!("No feed links on the root, trying {}", view);
            polite_pause(settings.feed_delay()).await;

            let Some(html) = self.fetch_optional(&view, timeout).await else {
                continue;
            };
            let feeds = matching_links(&html, &base, &settings.feed_pattern)?;
            if !feeds.is_empty() {
                return Ok(feeds);
            }
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl EventAdapter for LibraryCalendarAdapter {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>> {
        let settings = &self.config.librarycalendar;
        let timeout = self.config.crawler.timeout();

        let mut feeds = self.discover_feeds(calendar_root, timeout).await?;
        if feeds.len() > settings.max_feeds {
            log::info!("Keeping {} of {} feed pages", settings.max_feeds, feeds.len());
            feeds.truncate(settings.max_feeds);
        }
        log::debug!("{} feed pages under {}", feeds.len(), calendar_root);

        let mut seen = HashSet::new();
        let mut detail_urls = Vec::new();
        for (i, feed) in feeds.iter().enumerate() {
            if i > 0 {
                polite_pause(settings.feed_delay()).await;
            }
            let Some(html) = self.fetch_optional(feed, timeout).await else {
                continue;
            };
            let base = Url::parse(feed)?;
            for url in matching_links(&html, &base, &settings.event_pattern)? {
                if seen.insert(url.clone()) {
                    detail_urls.push(url);
                }
            }
        }
        log::debug!("{} event detail pages under {}", detail_urls.len(), calendar_root);

        let mut events = Vec::with_capacity(detail_urls.len());
        for (i, url) in detail_urls.iter().enumerate() {
            if i > 0 {
                polite_pause(settings.detail_delay()).await;
            }
            let Some(html) = self.fetch_optional(url, timeout).await else {
                continue;
            };
            events.push(RawEvent::LibraryCalendar(parse_detail(&html, url)?));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::ScriptedFetcher;

    const DETAIL: &str = r#"<html><head>
        <script type="application/ld+json">
        {"@context": "https://schema.org", "@graph": [
          {"@type": "WebPage", "name": "ignored"},
          {"@type": ["Event"], "name": "Teen Anime Club",
           "description": "<p>Watch &amp; draw</p>",
           "startDate": "2026-01-07T16:00:00-05:00",
           "endDate": "2026-01-07T17:00:00-05:00",
           "location": {"@type": "Place", "name": "Teen Room",
             "address": {"streetAddress": "1 Main St", "addressLocality": "Exton",
                         "addressRegion": "PA", "postalCode": "19341", "addressCountry": "US"}},
           "organizer": {"name": "Chester County Library", "url": "https://ccls.org"}}
        ]}
        </script></head><body>
        <div class="lc-event__age-groups"><a href="/t">Teens</a><a href="/a">Tweens</a></div>
        <div class="lc-event-info-item--date">Wednesday, January 7, 2026</div>
        <div class="lc-event-info-item--time"> 4:00pm - 5:00pm </div>
        <div class="lc-event-contact-name">Name: Pat Lee</div>
        <div class="lc-event-contact-email"><a href="mailto:p@ccls.org">p@ccls.org</a></div>
        </body></html>"#;

    fn quiet_config() -> Arc<Config> {
        let mut config = Config::default();
        config.librarycalendar.feed_delay_ms = 0;
        config.librarycalendar.detail_delay_ms = 0;
        Arc::new(config)
    }

    #[test]
    fn test_parse_detail_reads_jsonld_and_markup() {
        let event = parse_detail(DETAIL, "https://lib.org/event/teen-anime-1").unwrap();

        assert_eq!(event.name.as_deref(), Some("Teen Anime Club"));
        assert_eq!(event.description.as_deref(), Some("Watch & draw"));
        assert_eq!(event.start_date.as_deref(), Some("2026-01-07T16:00:00-05:00"));
        assert_eq!(event.location_name.as_deref(), Some("Teen Room"));
        let address = event.address.unwrap();
        assert_eq!(address.city.as_deref(), Some("Exton"));
        assert_eq!(address.zip.as_deref(), Some("19341"));
        assert_eq!(event.organizer_name.as_deref(), Some("Chester County Library"));
        assert_eq!(event.age_groups, vec!["Teens", "Tweens"]);
        assert_eq!(event.time_display.as_deref(), Some("4:00pm - 5:00pm"));
        let contact = event.contact.unwrap();
        assert_eq!(contact.name.as_deref(), Some("Pat Lee"));
        assert_eq!(contact.email.as_deref(), Some("p@ccls.org"));
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn test_malformed_jsonld_keeps_page_fields() {
        let html = r#"<script type="application/ld+json">{not json</script>
            <div class="lc-event-info-item--date">Friday</div>"#;
        let event = parse_detail(html, "https://lib.org/event/x").unwrap();
        assert_eq!(event.name, None);
        assert_eq!(event.date_display.as_deref(), Some("Friday"));
        assert!(!event.is_blank());
    }

    #[test]
    fn test_location_and_address_shapes() {
        let parsed = parse_jsonld_event(
            r#"[{"@type": "Event", "name": "A", "location": ["Branch Hall"]}]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(parsed.location_name.as_deref(), Some("Branch Hall"));

        let parsed = parse_jsonld_event(
            r#"{"@type": "Event", "location": {"name": "B", "address": "5 Oak Ave"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(parsed.address.unwrap().street.as_deref(), Some("5 Oak Ave"));

        assert_eq!(
            parse_jsonld_event(r#"{"@type": "Organization", "name": "Lib"}"#).unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_crawls_alternate_view_feeds_and_details() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page("https://lib.org/events", 200, "<html><p>Loading…</p></html>")
                .page("https://lib.org/events/month", 404, "")
                .page(
                    "https://lib.org/events/upcoming",
                    200,
                    r#"<a href="/events/feed/html?current_date=2026-01-07">Jan 7</a>
                       <a href="/events/feed/html?current_date=2026-01-07">again</a>
                       <a href="/events/feed/html?current_date=2026-01-08">Jan 8</a>"#,
                )
                .page(
                    "https://lib.org/events/feed/html?current_date=2026-01-07",
                    200,
                    r#"<a href="/event/teen-anime-1">Teen Anime</a><a href="/events/list">All</a>"#,
                )
                .page(
                    "https://lib.org/events/feed/html?current_date=2026-01-08",
                    200,
                    r#"<a href="/event/teen-anime-1">Teen Anime</a><a href="/event/gone-2">Gone</a>"#,
                )
                .page("https://lib.org/event/teen-anime-1", 200, DETAIL)
                .page("https://lib.org/event/gone-2", 410, ""),
        );
        let adapter = LibraryCalendarAdapter::new(quiet_config(), fetcher.clone());

        let events = adapter.extract("https://lib.org/events").await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(!fetcher.fetched().contains(&"https://lib.org/events/list".to_string()));
        let detail_fetches = fetcher
            .fetched()
            .iter()
            .filter(|u| u.as_str() == "https://lib.org/event/teen-anime-1")
            .count();
        assert_eq!(detail_fetches, 1);
    }

    #[tokio::test]
    async fn test_feed_cap_is_respected() {
        let links: String = (1..=5)
            .map(|d| format!(r#"<a href="/events/feed/html?current_date=2026-01-0{d}">{d}</a>"#))
            .collect();
        let mut config = Config::default();
        config.librarycalendar.feed_delay_ms = 0;
        config.librarycalendar.max_feeds = 2;
        let fetcher = Arc::new(ScriptedFetcher::new().page("https://lib.org/events", 200, links));
        let adapter = LibraryCalendarAdapter::new(Arc::new(config), fetcher.clone());

        assert!(adapter.extract("https://lib.org/events").await.unwrap().is_empty());
        let feed_fetches = fetcher
            .fetched()
            .iter()
            .filter(|u| u.contains("/events/feed/html"))
            .count();
        assert_eq!(feed_fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_and_detail_hops_are_spaced() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .page(
                    "https://lib.org/events",
                    200,
                    r#"<a href="/events/feed/html?current_date=2026-01-07">Jan 7</a>
                       <a href="/events/feed/html?current_date=2026-01-08">Jan 8</a>"#,
                )
                .page(
                    "https://lib.org/events/feed/html?current_date=2026-01-07",
                    200,
                    r#"<a href="/event/one">One</a><a href="/event/two">Two</a>"#,
                )
                .page(
                    "https://lib.org/events/feed/html?current_date=2026-01-08",
                    200,
                    r#"<a href="/event/three">Three</a>"#,
                )
                .prefix("https://lib.org/event/", 200, DETAIL),
        );
        let config = Config::default();
        let feed_delay = config.librarycalendar.feed_delay();
        let detail_delay = config.librarycalendar.detail_delay();
        let adapter = LibraryCalendarAdapter::new(Arc::new(config), fetcher.clone());

        let events = adapter.extract("https://lib.org/events").await.unwrap();
        assert_eq!(events.len(), 3);

        let hops = |needle: &str| -> Vec<tokio::time::Instant> {
            fetcher
                .timeline()
                .into_iter()
                .filter(|(_, line)| line.contains(needle))
                .map(|(at, _)| at)
                .collect()
        };
        let feeds = hops("/events/feed/html");
        assert_eq!(feeds.len(), 2);
        assert!(feeds[1] - feeds[0] >= feed_delay);
        let details = hops("/event/");
        assert_eq!(details.len(), 3);
        assert!(details.windows(2).all(|w| w[1] - w[0] >= detail_delay));
    }
}
