//! Local filesystem storage implementation.
//!
//! All writes are atomic: the file is written next to its target and then
//! renamed over it, so an interrupted run never leaves a truncated
//! checkpoint that a later run would trust.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{FailureRecord, NormalizedEvent, OutputConfig};
use crate::storage::{EventStorage, WriteMetadata};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    layout: OutputConfig,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::with_layout(root_dir, OutputConfig::default())
    }

    /// Create a LocalStorage with custom artifact names.
    pub fn with_layout(root_dir: impl Into<PathBuf>, layout: OutputConfig) -> Self {
        Self {
            root_dir: root_dir.into(),
            layout,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn library_key(&self, key: &str) -> String {
        format!("{}/{}.json", self.layout.library_dir, key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl EventStorage for LocalStorage {
    async fn load_library(&self, key: &str) -> Result<Option<Vec<NormalizedEvent>>> {
        self.read_json(&self.library_key(key)).await
    }

    async fn write_library(&self, key: &str, events: &[NormalizedEvent]) -> Result<()> {
        log::debug!("Checkpointing {} ({} events)", key, events.len());
        self.write_json(&self.library_key(key), events).await
    }

    async fn write_aggregate(
        &self,
        events: &[NormalizedEvent],
        failures: &[FailureRecord],
    ) -> Result<WriteMetadata> {
        self.write_json(&self.layout.events_file, events).await?;
        self.write_json(&self.layout.failures_file, failures).await?;
        log::info!(
            "Wrote {} events and {} failures to {}",
            events.len(),
            failures.len(),
            self.root_dir.display()
        );

        Ok(WriteMetadata {
            event_count: events.len(),
            failure_count: failures.len(),
            timestamp: Utc::now(),
        })
    }
}
