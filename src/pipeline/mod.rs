//! Pipeline entry points.
//!
//! - `LibraryProcessor`: one library from homepage to normalized events
//! - `run_pipeline`: the whole roster, with resume and aggregation

pub mod library;
pub mod run;

pub use library::{LibraryProcessor, LibraryStage};
pub use run::run_pipeline;
