//! ROT-prefixed error types with structured error codes and exit codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::reconcile::outcome::RunReport;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RotError>;

/// Top-level error type for rotwatch.
#[derive(Debug, Error)]
pub enum RotError {
    #[error("[ROT-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ROT-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ROT-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ROT-1101] no store exists at {path} so cannot test; run a normal scan once first")]
    StoreMissing { path: PathBuf },

    #[error("[ROT-2001] store integrity check failed for {path}: {details}")]
    IntegrityFailed { path: PathBuf, details: String },

    #[error("[ROT-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ROT-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[ROT-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ROT-3004] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[ROT-3900] runtime failure: {details}")]
    Runtime { details: String },

    #[error("[ROT-4001] there were {} errors found", paths.len())]
    CorruptionFound {
        paths: Vec<String>,
        report: Box<RunReport>,
    },
}

impl RotError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ROT-1001",
            Self::MissingConfig { .. } => "ROT-1002",
            Self::ConfigParse { .. } => "ROT-1003",
            Self::StoreMissing { .. } => "ROT-1101",
            Self::IntegrityFailed { .. } => "ROT-2001",
            Self::Serialization { .. } => "ROT-2101",
            Self::Sql { .. } => "ROT-2102",
            Self::Io { .. } => "ROT-3002",
            Self::ChannelClosed { .. } => "ROT-3004",
            Self::Runtime { .. } => "ROT-3900",
            Self::CorruptionFound { .. } => "ROT-4001",
        }
    }

    /// Process exit code contract for callers that wrap a run in a binary.
    ///
    /// Corruption (1) and a failed store integrity check (3) are kept apart so
    /// schedulers can tell "your files rotted" from "the tracking data rotted".
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::CorruptionFound { .. } => 1,
            Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::ConfigParse { .. }
            | Self::StoreMissing { .. } => 2,
            Self::IntegrityFailed { .. } => 3,
            Self::Serialization { .. }
            | Self::Sql { .. }
            | Self::Io { .. }
            | Self::ChannelClosed { .. }
            | Self::Runtime { .. } => 4,
        }
    }

    /// Report of the finished run, when the error was raised after bookkeeping.
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::CorruptionFound { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<rusqlite::Error> for RotError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for RotError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RotError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
