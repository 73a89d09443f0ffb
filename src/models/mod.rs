// src/models/mod.rs

//! Domain models for the events pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod candidate;
mod config;
mod decision;
mod event;
mod library;
mod outcome;

// Re-export all public types
pub use candidate::{CandidateLink, PageLink, ScoreReason};
pub use config::{
    ClassifierConfig, Config, CrawlerConfig, GenericConfig, LibCalConfig, LibraryCalendarConfig,
    OutputConfig, RendererConfig, ScoringConfig, WordPressConfig,
};
pub use decision::{CalendarDecision, Platform};
pub use event::{
    AdapterKind, Address, Contact, GenericLink, ICalEvent, LibCalEvent, LibraryCalendarEvent,
    NormalizedEvent, RawEvent, TecEvent, TecVenue,
};
pub use library::{Library, LibraryAddress};
pub use outcome::{FailureReason, FailureRecord, LibraryOutcome, PipelineResult, RunSummary};
