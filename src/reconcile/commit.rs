//! Commit batching: at most one store commit per interval.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

/// Decides when an open batch is due for commit.
///
/// The first mutation of a run is always due, then at most one commit per
/// `interval`. A zero interval commits after every mutation.
#[derive(Debug, Clone)]
pub struct CommitPolicy {
    interval: Duration,
    last_commit: Option<Instant>,
}

impl CommitPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_commit: None,
        }
    }

    /// Build from seconds as stored in config. Values that cannot form a
    /// duration fall back to committing every mutation.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self::new(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_commit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    pub fn record_commit(&mut self, now: Instant) {
        self.last_commit = Some(now);
    }
}
