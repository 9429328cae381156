//! Core domain logic for docbridge.
//!
//! Enumerates a local corpus, uploads each unit exactly once across resumable
//! runs, exports the resulting ID → reference mapping, and reconciles that
//! mapping into a destination table.

pub mod corpus;
pub mod discrepancy;
pub mod mapping;
pub mod pacing;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod upload;

pub use pipeline::{ProgressReporter, SilentProgress, UnitOutcome};
