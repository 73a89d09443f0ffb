// src/models/library.rs

//! Library roster records.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A public library from the input roster.
///
/// Roster entries are read-only for the whole run; derived data such as the
/// calendar root travels in [`crate::models::LibraryOutcome`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Library {
    /// Library display name
    pub name: String,

    /// Homepage URL
    #[serde(default)]
    pub website: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,

    /// Free-form street address parts
    #[serde(flatten)]
    pub address: LibraryAddress,
}

/// Address parts as supplied by the roster source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryAddress {
    #[serde(default, rename = "addr_housenumber", skip_serializing_if = "Option::is_none")]
    pub housenumber: Option<String>,

    #[serde(default, rename = "addr_street", skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,

    #[serde(default, rename = "addr_city", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, rename = "addr_postcode", skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
}

impl Library {
    /// Create a library with just a name and homepage.
    pub fn new(name: impl Into<String>, website: Option<&str>) -> Self {
        Self {
            name: name.into(),
            website: website.map(str::to_string),
            lat: None,
            lon: None,
            address: LibraryAddress::default(),
        }
    }

    /// Load the roster from a JSON array file.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::roster(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::roster(format!("cannot parse {}: {e}", path.display())))
    }

    /// Homepage URL, if present and non-blank.
    pub fn homepage(&self) -> Option<&str> {
        self.website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    /// File-system safe key identifying this library's output artifact.
    ///
    /// Coordinates are appended when present so that branches sharing a
    /// name do not overwrite each other.
    pub fn artifact_key(&self) -> String {
        let mut key = sanitize(&self.name);
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            key.push_str(&format!("_{lat}_{lon}"));
        }
        if key.is_empty() {
            key.push_str("library");
        }
        key
    }
}

fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_replaces_separators() {
        let lib = Library::new("Blanche A. Nixon/Cobbs Creek Library", None);
        assert_eq!(lib.artifact_key(), "Blanche_A._Nixon_Cobbs_Creek_Library");
    }

    #[test]
    fn test_artifact_key_includes_coordinates() {
        let mut lib = Library::new("Main Branch", None);
        lib.lat = Some(39.9597);
        lib.lon = Some(-75.1715);
        assert_eq!(lib.artifact_key(), "Main_Branch_39.9597_-75.1715");
    }

    #[test]
    fn test_roster_ignores_unknown_fields() {
        let json = r#"[
            {"name": "Alpha", "website": "https://alpha.org", "lat": 40.1, "lon": -75.2,
             "addr_street": "Main St", "osm_id": 123, "operator": "County"},
            {"name": "Beta"}
        ]"#;
        let roster: Vec<Library> = serde_json::from_str(json).unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].homepage(), Some("https://alpha.org"));
        assert_eq!(roster[0].address.street.as_deref(), Some("Main St"));
        assert_eq!(roster[1].homepage(), None);
    }

    #[test]
    fn test_blank_website_is_absent() {
        let lib = Library::new("Gamma", Some("   "));
        assert_eq!(lib.homepage(), None);
    }
}
