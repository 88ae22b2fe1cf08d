//! Reconciliation engine: classifies every scanned file against the store.

pub mod commit;
pub mod engine;
pub mod outcome;
pub mod progress;
pub mod rename;

pub use engine::{Reconciler, RunOptions};
pub use outcome::{AmbiguousRename, CorruptionRecord, Rename, RunReport, ScanOutcome};
