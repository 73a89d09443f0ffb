// src/models/decision.rs

//! Calendar platform classification results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Software platform serving a library's events calendar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Springshare LibCal
    Libcal,
    /// LibraryCalendar (Drupal / Communico style)
    Librarycalendar,
    /// WordPress with The Events Calendar REST API
    WordpressTec,
    /// WordPress without a detectable events API
    WordpressOther,
    Other,
    Unknown,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Libcal,
        Platform::Librarycalendar,
        Platform::WordpressTec,
        Platform::WordpressOther,
        Platform::Other,
        Platform::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Libcal => "libcal",
            Platform::Librarycalendar => "librarycalendar",
            Platform::WordpressTec => "wordpress_tec",
            Platform::WordpressOther => "wordpress_other",
            Platform::Other => "other",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == tag)
            .ok_or_else(|| format!("unknown platform tag '{s}'"))
    }
}

/// Which calendar root was chosen and what platform serves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarDecision {
    pub calendar_root: Option<String>,
    pub platform: Platform,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub notes: String,
}

impl CalendarDecision {
    /// Note attached when an external payload could not be coerced.
    pub const PARSE_FAILURE_NOTE: &'static str = "failed_to_parse_agent_output";

    pub fn new(
        calendar_root: Option<String>,
        platform: Platform,
        confidence: f64,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            calendar_root,
            platform,
            confidence: confidence.clamp(0.0, 1.0),
            notes: notes.into(),
        }
    }

    /// Decision carrying no root and no platform knowledge.
    pub fn unknown(notes: impl Into<String>) -> Self {
        Self::new(None, Platform::Unknown, 0.0, notes)
    }

    /// Coerce a payload returned by an external classifier.
    ///
    /// Accepts an object, or a string holding a JSON object. Anything else,
    /// including objects with a missing or unrecognized `platform`, becomes
    /// the safe default decision.
    pub fn from_external(raw: &Value) -> Self {
        let coerced = match raw {
            Value::Object(_) => Self::from_object(raw),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(inner @ Value::Object(_)) => Self::from_object(&inner),
                _ => None,
            },
            _ => None,
        };

        coerced.unwrap_or_else(|| {
            log::debug!("External classifier payload rejected: {raw}");
            Self::unknown(Self::PARSE_FAILURE_NOTE)
        })
    }

    fn from_object(value: &Value) -> Option<Self> {
        let platform = value.get("platform")?.as_str()?.parse::<Platform>().ok()?;

        let calendar_root = match value.get("calendar_root") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => {
                let root = s.trim();
                if !(root.starts_with("http://") || root.starts_with("https://")) {
                    return None;
                }
                Some(root.to_string())
            }
            Some(_) => return None,
        };

        let confidence = match value.get("confidence") {
            None | Some(Value::Null) => 0.0,
            Some(c) => c.as_f64()?,
        };

        let notes = value
            .get("notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self::new(calendar_root, platform, confidence, notes))
    }
}
