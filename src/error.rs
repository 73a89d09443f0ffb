// src/error.rs

//! Unified error handling for the events pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed at the network level
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A required fetch answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Roster could not be loaded
    #[error("Roster error: {0}")]
    Roster(String),

    /// Platform adapter failed during extraction
    #[error("Adapter error ({platform}): {message}")]
    Adapter { platform: String, message: String },

    /// External page renderer failed
    #[error("Render error: {0}")]
    Render(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a roster loading error.
    pub fn roster(message: impl Into<String>) -> Self {
        Self::Roster(message.into())
    }

    /// Create an adapter error tagged with the platform that raised it.
    pub fn adapter(platform: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Adapter {
            platform: platform.into(),
            message: message.to_string(),
        }
    }

    /// Create an error for a non-success HTTP status.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }
}
