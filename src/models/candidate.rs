//! Homepage links and their calendar-root scores.

use serde::{Deserialize, Serialize};

/// An anchor extracted from a page, with its href resolved to an absolute URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageLink {
    /// Visible anchor text, whitespace-collapsed
    pub text: String,

    /// Absolute http(s) URL
    pub url: String,

    /// Raw `class` attribute, used for call-to-action detection
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
}

/// Why a candidate link earned part of its score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    KeywordInText,
    KeywordInUrl,
    ButtonStyle,
    CalendarPlatform,
}

/// A scored calendar-root candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateLink {
    pub text: String,
    pub url: String,
    pub score: u32,
    pub reasons: Vec<ScoreReason>,
}
