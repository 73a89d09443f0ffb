// src/models/event.rs

//! Event records: platform-native intermediates and the normalized schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extraction strategy that produced an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Libcal,
    Librarycalendar,
    WordpressTec,
    IcalFeed,
    GenericHtml,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Libcal => "libcal",
            AdapterKind::Librarycalendar => "librarycalendar",
            AdapterKind::WordpressTec => "wordpress_tec",
            AdapterKind::IcalFeed => "ical_feed",
            AdapterKind::GenericHtml => "generic_html",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured postal address; every part may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip.is_none()
            && self.country.is_none()
    }
}

/// One result row of the LibCal `/ajax/calendar/list` endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibCalEvent {
    pub title: Option<String>,
    pub url: Option<String>,
    /// Human date, e.g. "Monday, January 5, 2026"
    pub date: Option<String>,
    /// Human start/end times, e.g. "10:00am"
    pub start: Option<String>,
    pub end: Option<String>,
    /// Machine timestamps when the endpoint supplies them
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub campus: Option<String>,
    pub location: Option<String>,
    /// Short description with markup removed
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub audiences: Vec<String>,
    pub raw: Value,
}

/// Event detail page of a LibraryCalendar site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryCalendarEvent {
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location_name: Option<String>,
    pub address: Option<Address>,
    pub organizer_name: Option<String>,
    pub organizer_url: Option<String>,
    pub age_groups: Vec<String>,
    pub date_display: Option<String>,
    pub time_display: Option<String>,
    pub contact: Option<Contact>,
}

/// Contact block of a LibraryCalendar event page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl LibraryCalendarEvent {
    /// True when the page yielded nothing beyond its URL.
    pub fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.date_display.is_none()
            && self.time_display.is_none()
            && self.location_name.is_none()
    }
}

/// One entry of the WordPress TEC `/wp-json/tribe/events/v1/events` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TecEvent {
    pub title: Option<String>,
    pub url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub venue: Option<TecVenue>,
    pub categories: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TecVenue {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// A `VEVENT` from an iCalendar feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ICalEvent {
    pub feed_url: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
}

/// A program-like anchor picked up by the generic HTML fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericLink {
    pub title: String,
    pub url: String,
}

/// Platform-native event record produced by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    LibCal(LibCalEvent),
    LibraryCalendar(LibraryCalendarEvent),
    WordPressTec(TecEvent),
    ICal(ICalEvent),
    Generic(GenericLink),
}

impl RawEvent {
    pub fn kind(&self) -> AdapterKind {
        match self {
            RawEvent::LibCal(_) => AdapterKind::Libcal,
            RawEvent::LibraryCalendar(_) => AdapterKind::Librarycalendar,
            RawEvent::WordPressTec(_) => AdapterKind::WordpressTec,
            RawEvent::ICal(_) => AdapterKind::IcalFeed,
            RawEvent::Generic(_) => AdapterKind::GenericHtml,
        }
    }

    /// Whether the record carries anything worth keeping.
    pub fn has_usable_fields(&self) -> bool {
        match self {
            RawEvent::LibCal(e) => e.title.is_some() || e.url.is_some(),
            RawEvent::LibraryCalendar(e) => !e.is_blank(),
            RawEvent::WordPressTec(e) => e.title.is_some() || e.url.is_some(),
            RawEvent::ICal(e) => e.summary.is_some() || e.start.is_some(),
            RawEvent::Generic(e) => !e.title.is_empty(),
        }
    }
}

/// The single output schema shared by every platform.
///
/// Every field is always serialized; absent data is `null` or `[]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedEvent {
    pub library_name: String,
    pub library_website: Option<String>,
    pub platform: AdapterKind,
    pub title: Option<String>,
    pub url: Option<String>,
    /// ISO 8601 when the source provides it
    pub start: Option<String>,
    pub end: Option<String>,
    pub date_display: Option<String>,
    pub time_display: Option<String>,
    pub location_name: Option<String>,
    pub address: Address,
    pub audience: Vec<String>,
    pub categories: Vec<String>,
    pub description: Option<String>,
    /// Platform-specific data not captured by the fields above
    pub raw: Option<Value>,
}
