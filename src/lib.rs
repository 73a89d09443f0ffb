// src/lib.rs

//! Library events: calendar discovery and multi-platform event extraction.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
