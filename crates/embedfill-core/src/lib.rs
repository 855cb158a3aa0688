//! Shared vocabulary of the embedding backfill workspace.
//!
//! Holds the domain types, the error taxonomy, the traits the pipeline
//! talks to (source store, destination store, embedding provider), the retry
//! policy, and the Figment-based configuration loader.

pub mod config;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

/// Failure reason recorded for records whose text is empty or blank.
pub const EMPTY_TEXT_REASON: &str = "empty text";
