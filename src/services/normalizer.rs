// src/services/normalizer.rs

//! Mapping of platform-native events onto [`NormalizedEvent`].

use serde_json::{Map, Value, json};

use crate::models::{
    AdapterKind, Address, GenericLink, ICalEvent, LibCalEvent, LibraryCalendarEvent,
    NormalizedEvent, RawEvent, TecEvent,
};
use crate::utils::iso_datetime;

/// Map any adapter's record into the shared output schema.
pub fn normalize(
    raw: &RawEvent,
    library_name: &str,
    library_website: Option<&str>,
) -> NormalizedEvent {
    let mut event = match raw {
        RawEvent::LibCal(e) => from_libcal(e),
        RawEvent::LibraryCalendar(e) => from_librarycalendar(e),
        RawEvent::WordPressTec(e) => from_tec(e),
        RawEvent::ICal(e) => from_ical(e),
        RawEvent::Generic(e) => from_generic(e),
    };
    event.library_name = library_name.to_string();
    event.library_website = library_website.map(str::to_string);
    event
}

fn blank(platform: AdapterKind) -> NormalizedEvent {
    NormalizedEvent {
        library_name: String::new(),
        library_website: None,
        platform,
        title: None,
        url: None,
        start: None,
        end: None,
        date_display: None,
        time_display: None,
        location_name: None,
        address: Address::default(),
        audience: Vec::new(),
        categories: Vec::new(),
        description: None,
        raw: None,
    }
}

fn iso(value: Option<&String>) -> Option<String> {
    value.map(|v| iso_datetime(v))
}

fn from_libcal(e: &LibCalEvent) -> NormalizedEvent {
    let time_display = match (&e.start, &e.end) {
        (Some(start), Some(end)) => Some(format!("{start}–{end}")),
        (Some(start), None) => Some(start.clone()),
        (None, _) => None,
    };
    NormalizedEvent {
        title: e.title.clone(),
        url: e.url.clone(),
        start: iso(e.start_timestamp.as_ref()),
        end: iso(e.end_timestamp.as_ref()),
        date_display: e.date.clone(),
        time_display,
        location_name: e.campus.clone().or_else(|| e.location.clone()),
        audience: e.audiences.clone(),
        categories: e.categories.clone(),
        description: e.description.clone(),
        raw: Some(e.raw.clone()),
        ..blank(AdapterKind::Libcal)
    }
}

fn from_librarycalendar(e: &LibraryCalendarEvent) -> NormalizedEvent {
    let mut extra = Map::new();
    if e.organizer_name.is_some() || e.organizer_url.is_some() {
        extra.insert(
            "organizer".into(),
            json!({ "name": e.organizer_name, "url": e.organizer_url }),
        );
    }
    if let Some(contact) = &e.contact {
        extra.insert("contact".into(), json!(contact));
    }

    NormalizedEvent {
        title: e.name.clone(),
        url: Some(e.url.clone()),
        start: iso(e.start_date.as_ref()),
        end: iso(e.end_date.as_ref()),
        date_display: e.date_display.clone(),
        time_display: e.time_display.clone(),
        location_name: e.location_name.clone(),
        address: e.address.clone().unwrap_or_default(),
        audience: e.age_groups.clone(),
        description: e.description.clone(),
        raw: (!extra.is_empty()).then_some(Value::Object(extra)),
        ..blank(AdapterKind::Librarycalendar)
    }
}

fn from_tec(e: &TecEvent) -> NormalizedEvent {
    let venue = e.venue.clone().unwrap_or_default();
    NormalizedEvent {
        title: e.title.clone(),
        url: e.url.clone(),
        start: iso(e.start_date.as_ref()),
        end: iso(e.end_date.as_ref()),
        location_name: venue.name,
        address: Address {
            street: venue.address,
            city: venue.city,
            state: venue.state,
            zip: venue.zip,
            country: venue.country,
        },
        categories: e.categories.clone(),
        description: e.description.clone(),
        raw: Some(e.raw.clone()),
        ..blank(AdapterKind::WordpressTec)
    }
}

fn from_ical(e: &ICalEvent) -> NormalizedEvent {
    NormalizedEvent {
        title: e.summary.clone(),
        url: e.url.clone(),
        start: e.start.clone(),
        end: e.end.clone(),
        location_name: e.location.clone(),
        categories: e.categories.clone(),
        description: e.description.clone(),
        raw: Some(json!({ "feed_url": e.feed_url })),
        ..blank(AdapterKind::IcalFeed)
    }
}

fn from_generic(e: &GenericLink) -> NormalizedEvent {
    NormalizedEvent {
        title: Some(e.title.clone()),
        url: Some(e.url.clone()),
        ..blank(AdapterKind::GenericHtml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, TecVenue};

    const FIELDS: [&str; 15] = [
        "library_name",
        "library_website",
        "platform",
        "title",
        "url",
        "start",
        "end",
        "date_display",
        "time_display",
        "location_name",
        "address",
        "audience",
        "categories",
        "description",
        "raw",
    ];

    fn samples() -> Vec<RawEvent> {
        vec![
            RawEvent::LibCal(LibCalEvent {
                title: Some("Story Time".into()),
                start: Some("10:00am".into()),
                end: Some("10:30am".into()),
                start_timestamp: Some("2026-01-05 10:00:00".into()),
                campus: None,
                location: Some("Main".into()),
                ..LibCalEvent::default()
            }),
            RawEvent::LibraryCalendar(LibraryCalendarEvent {
                url: "https://lib.org/event/1".into(),
                contact: Some(Contact {
                    email: Some("p@lib.org".into()),
                    ..Contact::default()
                }),
                ..LibraryCalendarEvent::default()
            }),
            RawEvent::WordPressTec(TecEvent {
                title: Some("Yoga".into()),
                venue: Some(TecVenue {
                    name: Some("Hall".into()),
                    city: Some("Media".into()),
                    ..TecVenue::default()
                }),
                ..TecEvent::default()
            }),
            RawEvent::ICal(ICalEvent {
                feed_url: "https://lib.org/feed.ics".into(),
                summary: Some("Knitting".into()),
                ..ICalEvent::default()
            }),
            RawEvent::Generic(GenericLink {
                title: "Lego Club".into(),
                url: "https://lib.org/lego".into(),
            }),
        ]
    }

    #[test]
    fn test_every_field_present_for_every_platform() {
        for raw in samples() {
            let event = normalize(&raw, "Alpha Library", None);
            let json = serde_json::to_value(&event).unwrap();
            let object = json.as_object().unwrap();

            assert_eq!(object.len(), FIELDS.len(), "{:?}", raw.kind());
            for field in FIELDS {
                assert!(object.contains_key(field), "{field} missing for {:?}", raw.kind());
            }
            let address = object["address"].as_object().unwrap();
            for part in ["street", "city", "state", "zip", "country"] {
                assert!(address.contains_key(part));
            }
            assert_eq!(event.platform, raw.kind());
            assert_eq!(event.library_name, "Alpha Library");
        }
    }

    #[test]
    fn test_libcal_mapping() {
        let event = normalize(&samples()[0], "Alpha", Some("https://alpha.org"));
        assert_eq!(event.platform, AdapterKind::Libcal);
        assert_eq!(event.start.as_deref(), Some("2026-01-05T10:00:00"));
        assert_eq!(event.time_display.as_deref(), Some("10:00am–10:30am"));
        assert_eq!(event.location_name.as_deref(), Some("Main"));
        assert_eq!(event.library_website.as_deref(), Some("https://alpha.org"));
    }

    #[test]
    fn test_contact_travels_in_raw() {
        let event = normalize(&samples()[1], "Alpha", None);
        assert_eq!(event.raw.unwrap()["contact"]["email"], "p@lib.org");
        assert!(event.audience.is_empty());
    }

    #[test]
    fn test_tec_venue_fills_address() {
        let event = normalize(&samples()[2], "Alpha", None);
        assert_eq!(event.location_name.as_deref(), Some("Hall"));
        assert_eq!(event.address.city.as_deref(), Some("Media"));
        assert_eq!(event.address.street, None);
    }

    #[test]
    fn test_generic_has_only_title_and_url() {
        let event = normalize(&samples()[4], "Alpha", None);
        assert_eq!(event.title.as_deref(), Some("Lego Club"));
        assert_eq!(event.start, None);
        assert_eq!(event.raw, None);
        assert!(event.categories.is_empty());
    }
}
