//! Per-library outcomes and run-level accumulators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AdapterKind, CalendarDecision, NormalizedEvent};

/// Why a library ended in the failed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingWebsite,
    Unreachable,
    HttpStatus(u16),
    FetchError,
    /// Extraction raised; `None` when every fallback strategy failed
    Adapter(Option<AdapterKind>),
}

impl FailureReason {
    /// Stable reason code written to the failures file.
    pub fn code(&self) -> String {
        match self {
            FailureReason::MissingWebsite => "missing_website".to_string(),
            FailureReason::Unreachable => "unreachable".to_string(),
            FailureReason::HttpStatus(status) => format!("http_{status}"),
            FailureReason::FetchError => "fetch_error".to_string(),
            FailureReason::Adapter(Some(kind)) => format!("adapter_error:{kind}"),
            FailureReason::Adapter(None) => "adapter_error:fallback_chain".to_string(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// A library that could not be processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub library: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub reason: String,
    /// Underlying error message, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn new(library: impl Into<String>, website: Option<&str>, reason: &FailureReason) -> Self {
        Self {
            library: library.into(),
            website: website.map(str::to_string),
            reason: reason.code(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// Terminal state of one library.
#[derive(Debug, Clone)]
pub enum LibraryOutcome {
    /// Processed in this run; events may be empty
    Done {
        decision: CalendarDecision,
        events: Vec<NormalizedEvent>,
    },
    /// Checkpoint already present; events were reloaded from it
    Skipped { events: Vec<NormalizedEvent> },
    Failed(FailureRecord),
}

/// Accumulated outputs of one run, in roster order.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub events: Vec<NormalizedEvent>,
    pub failures: Vec<FailureRecord>,
    pub processed: usize,
    pub skipped: usize,
}

impl PipelineResult {
    pub fn record(&mut self, outcome: LibraryOutcome) {
        match outcome {
            LibraryOutcome::Done { events, .. } => {
                self.processed += 1;
                self.events.extend(events);
            }
            LibraryOutcome::Skipped { events } => {
                self.skipped += 1;
                self.events.extend(events);
            }
            LibraryOutcome::Failed(failure) => {
                self.processed += 1;
                self.failures.push(failure);
            }
        }
    }
}

/// Final figures of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub libraries: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub events: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
