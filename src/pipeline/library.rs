// src/pipeline/library.rs

//! Per-library state machine.
//!
//! ```text
//! PENDING → FETCHING_HOMEPAGE → {UNREACHABLE | SCORING_LINKS}
//!         → CLASSIFYING → EXTRACTING → NORMALIZING → DONE
//! ```
//!
//! `UNREACHABLE`, HTTP errors and adapter errors end in `FAILED`. A library
//! whose checkpoint already exists goes straight to `DONE`.
//!
//! All requests of a run share one [`HostThrottle`]; within a library a
//! [`PageMemo`] keeps any page, the calendar root in particular, from being
//! fetched twice.

use std::fmt;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{
    Config, FailureReason, FailureRecord, Library, LibraryOutcome, NormalizedEvent,
};
use crate::services::{
    CalendarScorer, ExternalClassifier, Extractor, PlatformClassifier, extract_links, normalize,
};
use crate::storage::EventStorage;
use crate::utils::http::{HostThrottle, PageFetcher, PageMemo, reachable};
use crate::utils::render::{PageRenderer, fetch_rendered};

/// Processing stage of one library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryStage {
    Pending,
    FetchingHomepage,
    Unreachable,
    ScoringLinks,
    Classifying,
    Extracting,
    Normalizing,
    Done,
    Failed,
}

impl fmt::Display for LibraryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LibraryStage::Pending => "PENDING",
            LibraryStage::FetchingHomepage => "FETCHING_HOMEPAGE",
            LibraryStage::Unreachable => "UNREACHABLE",
            LibraryStage::ScoringLinks => "SCORING_LINKS",
            LibraryStage::Classifying => "CLASSIFYING",
            LibraryStage::Extracting => "EXTRACTING",
            LibraryStage::Normalizing => "NORMALIZING",
            LibraryStage::Done => "DONE",
            LibraryStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Drives one library from its homepage to normalized events.
pub struct LibraryProcessor {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    storage: Arc<dyn EventStorage>,
    renderer: Option<Arc<dyn PageRenderer>>,
    external: Option<Arc<dyn ExternalClassifier>>,
    scorer: CalendarScorer,
}

impl LibraryProcessor {
    /// Wrap `fetcher` in a [`HostThrottle`] using `crawler.host_delay_ms`.
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<dyn EventStorage>,
    ) -> Self {
        Self {
            scorer: CalendarScorer::new(&config.scoring),
            fetcher: Arc::new(HostThrottle::new(fetcher, config.crawler.host_delay())),
            config,
            storage,
            renderer: None,
            external: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_external_classifier(mut self, external: Arc<dyn ExternalClassifier>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &dyn EventStorage {
        self.storage.as_ref()
    }

    fn classifier(&self, fetcher: Arc<dyn PageFetcher>) -> PlatformClassifier {
        let classifier = PlatformClassifier::new(Arc::clone(&self.config), fetcher);
        match &self.external {
            Some(external) => classifier.with_external(Arc::clone(external)),
            None => classifier,
        }
    }

    /// Run `library` to a terminal state.
    ///
    /// Every per-library problem becomes [`LibraryOutcome::Failed`]; only
    /// checkpoint I/O errors are returned as `Err`.
    pub async fn process(&self, library: &Library) -> Result<LibraryOutcome> {
        let key = library.artifact_key();
        match self.storage.load_library(&key).await {
            Ok(Some(events)) => {
                log::info!("{} already done ({} events), skipping", library.name, events.len());
                return Ok(LibraryOutcome::Skipped { events });
            }
            Ok(None) => {}
            Err(AppError::Json(e)) => {
                log::warn!("Checkpoint for {} is unreadable ({}), reprocessing", library.name, e);
            }
            Err(e) => return Err(e),
        }
        self.stage(library, LibraryStage::Pending);

        let Some(homepage) = library.homepage() else {
            return Ok(self.fail(library, FailureReason::MissingWebsite, None));
        };

        self.stage(library, LibraryStage::FetchingHomepage);
        let fetcher: Arc<dyn PageFetcher> = Arc::new(PageMemo::new(Arc::clone(&self.fetcher)));
        let crawler = &self.config.crawler;
        if !reachable(fetcher.as_ref(), homepage, crawler.reachability_timeout()).await {
            self.stage(library, LibraryStage::Unreachable);
            return Ok(self.fail(library, FailureReason::Unreachable, None));
        }

        let page = match fetch_rendered(
            fetcher.as_ref(),
            self.renderer.as_deref(),
            homepage,
            crawler.homepage_timeout(),
            &self.config.renderer,
        )
        .await
        {
            Ok(page) => page,
            Err(e) => return Ok(self.fail(library, FailureReason::FetchError, Some(e.to_string()))),
        };
        if !page.is_success() {
            return Ok(self.fail(library, FailureReason::HttpStatus(page.status), None));
        }

        self.stage(library, LibraryStage::ScoringLinks);
        let links = extract_links(page.text(), &page.final_url, crawler.max_links)
            .unwrap_or_else(|e| {
                log::warn!("Could not read links of {}: {}", page.final_url, e);
                Vec::new()
            });
        let candidates = self.scorer.score_candidates(&links);
        log::debug!(
            "{}: {} links, {} calendar candidates",
            library.name,
            links.len(),
            candidates.len()
        );

        self.stage(library, LibraryStage::Classifying);
        let decision = self
            .classifier(Arc::clone(&fetcher))
            .decide(&library.name, homepage, &candidates)
            .await;
        log::info!(
            "{}: {} ({:.2}) at {}",
            library.name,
            decision.platform,
            decision.confidence,
            decision.calendar_root.as_deref().unwrap_or("-")
        );
        let calendar_root = decision
            .calendar_root
            .clone()
            .unwrap_or_else(|| format!("{}/events", homepage.trim_end_matches('/')));

        self.stage(library, LibraryStage::Extracting);
        let extractor = Extractor::new(Arc::clone(&self.config), fetcher);
        let extraction = match extractor.extract(decision.platform, &calendar_root).await {
            Ok(extraction) => extraction,
            Err(failure) => {
                return Ok(self.fail(
                    library,
                    FailureReason::Adapter(failure.adapter),
                    Some(failure.error.to_string()),
                ));
            }
        };

        self.stage(library, LibraryStage::Normalizing);
        let events: Vec<NormalizedEvent> = extraction
            .events
            .iter()
            .filter(|raw| raw.has_usable_fields())
            .map(|raw| normalize(raw, &library.name, Some(homepage)))
            .collect();
        let dropped = extraction.events.len() - events.len();
        if dropped > 0 {
            log::debug!("{}: dropped {} events without usable fields", library.name, dropped);
        }

        self.storage.write_library(&key, &events).await?;
        self.stage(library, LibraryStage::Done);
        Ok(LibraryOutcome::Done { decision, events })
    }

    fn fail(&self, library: &Library, reason: FailureReason, detail: Option<String>) -> LibraryOutcome {
        self.stage(library, LibraryStage::Failed);
        log::warn!("{} failed: {}", library.name, reason);
        let mut record = FailureRecord::new(&library.name, library.homepage(), &reason);
        if let Some(detail) = detail {
            record = record.with_detail(detail);
        }
        LibraryOutcome::Failed(record)
    }

    fn stage(&self, library: &Library, stage: LibraryStage) {
        log::debug!("{} → {}", library.name, stage);
    }
}
