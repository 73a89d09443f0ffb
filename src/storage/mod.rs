//! Storage abstractions for event persistence.
//!
//! ## Directory Structure
//!
//! ```text
//! {output}/
//! ├── events_by_library/       # One checkpoint per completed library
//! │   ├── Alpha_Library_40.1_-75.2.json
//! │   └── Beta_Library.json
//! ├── events_all.json          # Aggregate of every library's events
//! └── events_failed.json       # Failure records of this run
//! ```
//!
//! A per-library file is written only when the library reaches `DONE`; its
//! presence is what lets a rerun skip that library.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{FailureRecord, NormalizedEvent};

pub use local::LocalStorage;

/// Metadata about an aggregate write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    pub event_count: usize,
    pub failure_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Trait for event storage backends.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Events checkpointed for `key`, or `None` when there is no checkpoint.
    async fn load_library(&self, key: &str) -> Result<Option<Vec<NormalizedEvent>>>;

    /// Checkpoint a completed library.
    async fn write_library(&self, key: &str, events: &[NormalizedEvent]) -> Result<()>;

    /// Write the aggregate events and failures files.
    async fn write_aggregate(
        &self,
        events: &[NormalizedEvent],
        failures: &[FailureRecord],
    ) -> Result<WriteMetadata>;
}
