//! Service layer for the events pipeline.
//!
//! This module contains the business logic for:
//! - Link extraction (`extract_links`)
//! - Calendar-root scoring (`CalendarScorer`)
//! - Platform classification (`PlatformClassifier`)
//! - Platform extraction adapters (`adapters`)
//! - Event normalization (`normalize`)

pub mod adapters;
mod classifier;
mod links;
mod normalizer;
mod scorer;

pub use adapters::{DispatchPolicy, EventAdapter, Extraction, ExtractionFailure, Extractor};
pub use classifier::{ExternalClassifier, HttpClassifier, PlatformClassifier};
pub use links::extract_links;
pub use normalizer::normalize;
pub use scorer::CalendarScorer;
