//! Utility functions and helpers.

pub mod http;
pub mod render;

use chrono::{NaiveDate, NaiveDateTime};
use scraper::{Html, Selector};
use url::Url;

use crate::error::{AppError, Result};

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve `href` against `base`, keeping the result only if it is http(s).
pub fn resolve_http(base: &Url, href: &str) -> Option<String> {
    let joined = base.join(href.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// Extract the domain from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
}

/// `scheme://host[:port]` of a URL, without a trailing slash.
pub fn origin(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Join whitespace runs into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an HTML fragment, with tags removed and whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// Like [`html_to_text`], but maps empty input or output to `None`.
pub fn clean_html(html: Option<&str>) -> Option<String> {
    html.map(html_to_text).filter(|t| !t.is_empty())
}

/// Trimmed, whitespace-collapsed text or `None` when blank.
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(collapse_whitespace).filter(|t| !t.is_empty())
}

/// Render a source timestamp as ISO 8601 when its form is recognized.
///
/// Handles iCalendar basic forms (`20260105T100000Z`, `20260105T100000`,
/// `20260105`) and space-separated `2026-01-05 10:00:00`. Anything else is
/// returned trimmed and unchanged.
pub fn iso_datetime(raw: &str) -> String {
    let raw = raw.trim();
    let (body, utc) = match raw.strip_suffix('Z') {
        Some(body) => (body, "Z"),
        None => (raw, ""),
    };

    for format in ["%Y%m%dT%H%M%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(body, format) {
            return format!("{}{utc}", dt.format("%Y-%m-%dT%H:%M:%S"));
        }
    }
    if utc.is_empty() {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y%m%d") {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

/// Parse a CSS selector, mapping failures into [`AppError::Selector`].
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_resolve_http_drops_other_schemes() {
        let base = Url::parse("https://example.com/").unwrap();
        assert_eq!(resolve_http(&base, "mailto:desk@example.com"), None);
        assert_eq!(resolve_http(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_http(&base, "tel:555-1234"), None);
        assert_eq!(
            resolve_http(&base, " /events "),
            Some("https://example.com/events".to_string())
        );
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://Example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(
            get_domain("https://sub.example.com:8080/path"),
            Some("sub.example.com".to_string())
        );
    }

    #[test]
    fn test_origin() {
        assert_eq!(
            origin("https://ccls.libcal.com/calendar?cid=1"),
            Some("https://ccls.libcal.com".to_string())
        );
        assert_eq!(
            origin("http://localhost:8080/a/b"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(origin("not a url"), None);
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>Story <b>time</b>\n for   kids</p><br/>"),
            "Story time for kids"
        );
        assert_eq!(clean_html(Some("<p> </p>")), None);
        assert_eq!(clean_html(None), None);
    }

    #[test]
    fn test_iso_datetime() {
        assert_eq!(iso_datetime("20260105T100000Z"), "2026-01-05T10:00:00Z");
        assert_eq!(iso_datetime("20260105T100000"), "2026-01-05T10:00:00");
        assert_eq!(iso_datetime("20260105"), "2026-01-05");
        assert_eq!(iso_datetime("2026-01-05 18:30:00"), "2026-01-05T18:30:00");
        assert_eq!(
            iso_datetime(" 2026-01-05T10:00:00-05:00 "),
            "2026-01-05T10:00:00-05:00"
        );
        assert_eq!(iso_datetime("10:00am"), "10:00am");
    }

    #[test]
    fn test_parse_selector() {
        assert!(parse_selector("div.class").is_ok());
        assert!(parse_selector("[[invalid").is_err());
    }
}
