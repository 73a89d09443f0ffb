// src/services/adapters/ical.rs

//! iCalendar feed adapter.

use std::io::BufReader;
use std::sync::Arc;

use async_trait::async_trait;
use ical::parser::ical::component::IcalEvent;
use scraper::Html;
use url::Url;

use super::EventAdapter;
use crate::error::{AppError, Result};
use crate::models::{Config, ICalEvent, RawEvent};
use crate::utils::http::{PageFetcher, fetch_required};
use crate::utils::{iso_datetime, non_blank, parse_selector, resolve_http};

/// First `<link>` advertising an iCalendar feed, resolved against `base_url`.
pub fn find_feed_link(html: &str, base_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let selector = parse_selector("link[href]").ok()?;
    let document = Html::parse_document(html);

    document.select(&selector).find_map(|link| {
        let href = link.value().attr("href")?;
        let lower = href.to_lowercase();
        let is_calendar_type = link
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("text/calendar"));
        if lower.contains("ical") || lower.contains(".ics") || is_calendar_type {
            resolve_http(&base, href)
        } else {
            None
        }
    })
}

/// Undo RFC 5545 text escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push(' '),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a multi-valued property on unescaped commas.
fn split_values(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        match c {
            ',' if !escaped => items.push(std::mem::take(&mut current)),
            '\\' if !escaped => {
                escaped = true;
                current.push(c);
                continue;
            }
            _ => current.push(c),
        }
        escaped = false;
    }
    items.push(current);
    items
        .iter()
        .filter_map(|item| non_blank(Some(&unescape(item))))
        .collect()
}

fn to_event(event: &IcalEvent, feed_url: &str) -> ICalEvent {
    let mut parsed = ICalEvent {
        feed_url: feed_url.to_string(),
        ..ICalEvent::default()
    };
    for property in &event.properties {
        let Some(value) = property.value.as_deref() else {
            continue;
        };
        let text = || non_blank(Some(&unescape(value)));
        match property.name.as_str() {
            "SUMMARY" => parsed.summary = text(),
            "URL" => parsed.url = text(),
            "DTSTART" => parsed.start = Some(iso_datetime(value)),
            "DTEND" => parsed.end = Some(iso_datetime(value)),
            "LOCATION" => parsed.location = text(),
            "DESCRIPTION" => parsed.description = text(),
            "CATEGORIES" => parsed.categories.extend(split_values(value)),
            _ => {}
        }
    }
    parsed
}

/// Parse every `VEVENT` of an iCalendar document.
pub fn parse_feed(body: &str, feed_url: &str) -> Result<Vec<ICalEvent>> {
    let reader = ical::IcalParser::new(BufReader::new(body.as_bytes()));
    let mut events = Vec::new();
    for calendar in reader {
        let calendar = calendar
            .map_err(|e| AppError::adapter("ical_feed", format!("{feed_url}: {e}")))?;
        events.extend(calendar.events.iter().map(|e| to_event(e, feed_url)));
    }
    Ok(events)
}

/// Follows the page's advertised iCalendar feed.
pub struct ICalAdapter {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
}

impl ICalAdapter {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }
}

#[async_trait]
impl EventAdapter for ICalAdapter {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>> {
        let timeout = self.config.crawler.timeout();
        let root = fetch_required(self.fetcher.as_ref(), calendar_root, timeout).await?;

        let Some(feed_url) = find_feed_link(root.text(), &root.final_url) else {
            log::debug!("No iCal feed advertised on {}", calendar_root);
            return Ok(Vec::new());
        };
        log::info!("Reading iCal feed {}", feed_url);

        let feed = fetch_required(self.fetcher.as_ref(), &feed_url, timeout).await?;
        Ok(parse_feed(feed.text(), &feed_url)?
            .into_iter()
            .map(RawEvent::ICal)
            .collect())
    }
}
