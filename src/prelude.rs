//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use rotwatch::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, RotError};
pub use crate::core::paths::Normalization;

// Scanner
pub use crate::scanner::availability::{AlwaysLocal, AvailabilityProbe, PlatformProbe};
pub use crate::scanner::ignore::IgnoreRules;
pub use crate::scanner::walker::{DirectoryWalker, ScanSet, WalkerConfig};

// Hashing
pub use crate::hashing::pool::{FileDigest, FileError, HashJob, HashPool};

// Store
pub use crate::store::{FileRecord, IntegrityGuard, IntegrityStatus, Store, stable_sum};

// Reconcile
pub use crate::reconcile::progress::{Progress, TerminalProgress};
pub use crate::reconcile::{
    CorruptionRecord, Reconciler, Rename, RunOptions, RunReport, ScanOutcome,
};
