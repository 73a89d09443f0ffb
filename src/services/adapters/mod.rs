// src/services/adapters/mod.rs

//! Platform extraction adapters and the policy choosing between them.
//!
//! Every adapter turns a calendar root URL into platform-native
//! [`RawEvent`]s. Zero events is a valid result; errors are reserved for
//! failed required fetches and malformed responses.

mod generic;
mod ical;
mod libcal;
mod librarycalendar;
mod wordpress;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{AdapterKind, Config, Platform, RawEvent};
use crate::utils::http::PageFetcher;
use crate::utils::non_blank;

pub use generic::GenericHtmlAdapter;
pub use ical::{ICalAdapter, find_feed_link, parse_feed};
pub use libcal::{LibCalAdapter, extract_calendar_id};
pub use librarycalendar::{LibraryCalendarAdapter, has_librarycalendar_markup, parse_detail};
pub use wordpress::{WordPressTecAdapter, probe_tec_api};

/// Walks one platform's pages or API and yields its events.
#[async_trait]
pub trait EventAdapter: Send + Sync {
    async fn extract(&self, calendar_root: &str) -> Result<Vec<RawEvent>>;
}

/// Which adapters to try for a classified platform, and in what order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    fallback: Vec<AdapterKind>,
}

impl DispatchPolicy {
    /// Order used when the platform is not known: most structured first.
    pub const FALLBACK_ORDER: [AdapterKind; 4] = [
        AdapterKind::Libcal,
        AdapterKind::WordpressTec,
        AdapterKind::IcalFeed,
        AdapterKind::GenericHtml,
    ];

    pub fn new(fallback: Vec<AdapterKind>) -> Self {
        Self { fallback }
    }

    /// Adapters for `platform`; a single adapter for known platforms.
    pub fn strategies(&self, platform: Platform) -> Vec<AdapterKind> {
        match platform {
            Platform::Libcal => vec![AdapterKind::Libcal],
            Platform::Librarycalendar => vec![AdapterKind::Librarycalendar],
            Platform::WordpressTec => vec![AdapterKind::WordpressTec],
            Platform::WordpressOther | Platform::Other | Platform::Unknown => {
                self.fallback.clone()
            }
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::new(Self::FALLBACK_ORDER.to_vec())
    }
}

/// Events from a successful dispatch.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Adapter that produced the events; `None` when every strategy came back empty
    pub adapter: Option<AdapterKind>,
    pub events: Vec<RawEvent>,
}

/// A dispatch in which every strategy raised.
#[derive(Debug)]
pub struct ExtractionFailure {
    /// The failing adapter for a known platform; `None` for the fallback chain
    pub adapter: Option<AdapterKind>,
    pub error: AppError,
}

/// Runs adapters for a calendar decision according to a [`DispatchPolicy`].
pub struct Extractor {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    policy: DispatchPolicy,
}

impl Extractor {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::with_policy(config, fetcher, DispatchPolicy::default())
    }

    pub fn with_policy(
        config: Arc<Config>,
        fetcher: Arc<dyn PageFetcher>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            config,
            fetcher,
            policy,
        }
    }

    /// Build the adapter for `kind`.
    pub fn adapter(&self, kind: AdapterKind) -> Box<dyn EventAdapter> {
        let config = Arc::clone(&self.config);
        let fetcher = Arc::clone(&self.fetcher);
        match kind {
            AdapterKind::Libcal => Box::new(LibCalAdapter::new(config, fetcher)),
            AdapterKind::Librarycalendar => Box::new(LibraryCalendarAdapter::new(config, fetcher)),
            AdapterKind::WordpressTec => Box::new(WordPressTecAdapter::new(config, fetcher)),
            AdapterKind::IcalFeed => Box::new(ICalAdapter::new(config, fetcher)),
            AdapterKind::GenericHtml => Box::new(GenericHtmlAdapter::new(config, fetcher)),
        }
    }

    /// Extract events for `platform` from `calendar_root`.
    ///
    /// The first strategy returning events wins. A strategy that raises is
    /// logged and the next one is tried; the dispatch fails only when every
    /// strategy raised.
    pub async fn extract(
        &self,
        platform: Platform,
        calendar_root: &str,
    ) -> std::result::Result<Extraction, ExtractionFailure> {
        let strategies = self.policy.strategies(platform);
        let single = strategies.len() == 1;
        let mut last_error = None;
        let mut any_succeeded = false;

        for kind in strategies {
            log::debug!("Trying {} adapter on {}", kind, calendar_root);
            match self.adapter(kind).extract(calendar_root).await {
                Ok(events) if !events.is_empty() => {
                    log::info!("{} adapter found {} events", kind, events.len());
                    return Ok(Extraction {
                        adapter: Some(kind),
                        events,
                    });
                }
                Ok(_) => {
                    any_succeeded = true;
                    log::debug!("{} adapter found no events", kind);
                }
                Err(e) => {
                    log::warn!("{} adapter failed on {}: {}", kind, calendar_root, e);
                    last_error = Some((kind, e));
                }
            }
        }

        match last_error {
            Some((kind, error)) if !any_succeeded => Err(ExtractionFailure {
                adapter: single.then_some(kind),
                error,
            }),
            _ => Ok(Extraction {
                adapter: None,
                events: Vec::new(),
            }),
        }
    }
}

/// Text of a JSON scalar; blank strings and non-scalars are `None`.
pub(crate) fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_blank(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Names from a tag list: objects with a `name`, or bare strings.
pub(crate) fn value_tags(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(_) => value_text(item.get("name")),
                    other => value_text(Some(other)),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Serde helpers tolerating the loose typing of third-party JSON APIs.
pub(crate) mod lenient {
    use super::*;

    pub fn text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value_text(value.as_ref()))
    }

    pub fn tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value_tags(value.as_ref()))
    }
}
