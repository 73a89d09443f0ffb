// src/services/classifier.rs

//! Calendar platform classification.
//!
//! Structural probing of the calendar page is the primary path. An optional
//! external classifier can be consulted first; whatever it returns is coerced
//! through [`CalendarDecision::from_external`] before use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{CalendarDecision, CandidateLink, ClassifierConfig, Config, Platform};
use crate::services::adapters::{
    extract_calendar_id, find_feed_link, has_librarycalendar_markup, probe_tec_api,
};
use crate::utils::get_domain;
use crate::utils::http::PageFetcher;

const WORDPRESS_MARKERS: [&str; 2] = ["wp-content", "wp-json"];

/// A collaborator that picks the calendar root from ranked candidates.
#[async_trait]
pub trait ExternalClassifier: Send + Sync {
    /// Return a payload shaped like a [`CalendarDecision`], or anything else.
    async fn judge(
        &self,
        library_name: &str,
        homepage: &str,
        candidates: &[CandidateLink],
    ) -> Result<Value>;
}

/// External classifier reached over HTTP with a JSON POST.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpClassifier {
    /// Build from configuration; `None` when no endpoint is configured.
    ///
    /// The bearer token is read from the environment variable named by
    /// `api_key_env`.
    pub fn from_config(client: reqwest::Client, config: &ClassifierConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::warn!(
                "Classifier endpoint set but {} is empty; calling without credentials",
                config.api_key_env
            );
        }
        Some(Self {
            client,
            endpoint,
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl ExternalClassifier for HttpClassifier {
    async fn judge(
        &self,
        library_name: &str,
        homepage: &str,
        candidates: &[CandidateLink],
    ) -> Result<Value> {
        let payload = json!({
            "library_name": library_name,
            "homepage": homepage,
            "candidate_links": candidates,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(AppError::status(&self.endpoint, status));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Decides the calendar root and platform for one library.
pub struct PlatformClassifier {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    external: Option<Arc<dyn ExternalClassifier>>,
}

impl PlatformClassifier {
    pub fn new(config: Arc<Config>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config,
            fetcher,
            external: None,
        }
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalClassifier>) -> Self {
        self.external = Some(external);
        self
    }

    /// Pick the calendar root among `candidates` and classify it.
    ///
    /// A usable external verdict wins. Otherwise the best candidate is
    /// probed. Without any candidate the conventional `<homepage>/events`
    /// path is assumed with platform `unknown`.
    pub async fn decide(
        &self,
        library_name: &str,
        homepage: &str,
        candidates: &[CandidateLink],
    ) -> CalendarDecision {
        if self.external.is_some() {
            let verdict = self.consult(library_name, homepage, candidates).await;
            if verdict.platform != Platform::Unknown {
                let calendar_root = verdict
                    .calendar_root
                    .clone()
                    .or_else(|| candidates.first().map(|c| c.url.clone()));
                return CalendarDecision {
                    calendar_root,
                    ..verdict
                };
            }
            log::debug!(
                "External verdict for {} unusable ({}), probing instead",
                library_name,
                verdict.notes
            );
        }

        match candidates.first() {
            Some(best) => self.classify(&best.url, None).await,
            None => {
                let fallback = format!("{}/events", homepage.trim_end_matches('/'));
                log::info!("No calendar link on {}, assuming {}", homepage, fallback);
                CalendarDecision::new(
                    Some(fallback),
                    Platform::Unknown,
                    0.0,
                    "no calendar link found; conventional /events path",
                )
            }
        }
    }

    /// Ask the external classifier; never fails.
    ///
    /// Without an external classifier, or when the call itself fails, the
    /// result is an `unknown` decision.
    pub async fn consult(
        &self,
        library_name: &str,
        homepage: &str,
        candidates: &[CandidateLink],
    ) -> CalendarDecision {
        let Some(external) = &self.external else {
            return CalendarDecision::unknown("no external classifier");
        };
        let shortlist = &candidates[..candidates.len().min(self.config.classifier.max_candidates)];

        match external.judge(library_name, homepage, shortlist).await {
            Ok(raw) => CalendarDecision::from_external(&raw),
            Err(e) => {
                log::warn!("External classifier failed for {}: {}", library_name, e);
                CalendarDecision::unknown(format!("external classifier error: {e}"))
            }
        }
    }

    /// Probe `calendar_url` for a known platform.
    ///
    /// `page` is the already-fetched HTML of the URL, if any; otherwise it
    /// is fetched here. Checks run in order: LibCal calendar id,
    /// LibraryCalendar signature, WordPress TEC API, iCal feed link,
    /// WordPress markers.
    pub async fn classify(&self, calendar_url: &str, page: Option<&str>) -> CalendarDecision {
        let fetched;
        let html = match page {
            Some(html) => Some(html),
            None => {
                fetched = self.fetch_page(calendar_url).await;
                fetched.as_deref()
            }
        };
        let root = Some(calendar_url.to_string());

        if let Some(id) = html.and_then(extract_calendar_id) {
            return CalendarDecision::new(
                root,
                Platform::Libcal,
                0.9,
                format!("LibCal calendar id {id}"),
            );
        }

        let lc_host = get_domain(calendar_url).is_some_and(|d| d.contains("librarycalendar.com"));
        let lc_markup = html.is_some_and(|h| {
            has_librarycalendar_markup(h, &self.config.librarycalendar.feed_pattern)
        });
        if lc_host || lc_markup {
            return CalendarDecision::new(
                root,
                Platform::Librarycalendar,
                0.8,
                "LibraryCalendar signature",
            );
        }

        if probe_tec_api(
            self.fetcher.as_ref(),
            calendar_url,
            &self.config.wordpress,
            self.config.crawler.timeout(),
        )
        .await
        {
            return CalendarDecision::new(
                root,
                Platform::WordpressTec,
                0.85,
                "The Events Calendar REST API responded",
            );
        }

        let Some(html) = html else {
            return CalendarDecision::new(root, Platform::Unknown, 0.0, "calendar page unavailable");
        };

        if let Some(feed) = find_feed_link(html, calendar_url) {
            return CalendarDecision::new(root, Platform::Other, 0.5, format!("iCal feed {feed}"));
        }

        let lower = html.to_lowercase();
        if WORDPRESS_MARKERS.iter().any(|m| lower.contains(m)) {
            return CalendarDecision::new(
                root,
                Platform::WordpressOther,
                0.3,
                "WordPress without events API",
            );
        }

        CalendarDecision::new(root, Platform::Other, 0.1, "no platform signature")
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        match self.fetcher.fetch(url, self.config.crawler.timeout()).await {
            Ok(page) if page.is_success() => page.body,
            Ok(page) => {
                log::debug!("Calendar page {} answered {}", url, page.status);
                None
            }
            Err(e) => {
                log::debug!("Calendar page {} failed: {}", url, e);
                None
            }
        }
    }
}
