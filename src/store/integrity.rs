//! Integrity guard: a SHA-512 sidecar over the store's raw bytes.
//!
//! This protects the tracking metadata, not the tracked files. The check runs
//! before any row is read or written; the sidecar is refreshed only after a
//! commit has landed.

#![allow(missing_docs)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::StoreConfig;
use crate::core::errors::{Result, RotError};
use crate::hashing::digest::{STORE_DIGEST_HEX_LEN, sha512_file};

/// Result of a pre-run integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// No sidecar exists, so there is nothing to compare against.
    Unguarded,
    /// Store bytes match the sidecar digest.
    Verified,
}

/// Store file paired with its sidecar.
#[derive(Debug, Clone)]
pub struct IntegrityGuard {
    db_path: PathBuf,
    sidecar_path: PathBuf,
}

impl IntegrityGuard {
    pub fn new(db_path: impl Into<PathBuf>, sidecar_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            sidecar_path: sidecar_path.into(),
        }
    }

    /// Guard for the store living inside `root`.
    pub fn for_root(root: &Path, store: &StoreConfig) -> Self {
        Self::new(store.db_path(root), store.sidecar_path(root))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    /// Compare the store's current bytes with the sidecar.
    pub fn check(&self) -> Result<IntegrityStatus> {
        let Some(expected) = self.read_sidecar()? else {
            tracing::debug!(target: "rotwatch::store", "no integrity sidecar, skipping check");
            return Ok(IntegrityStatus::Unguarded);
        };

        let actual = match sha512_file(&self.db_path) {
            Ok(digest) => digest,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(self.failure("store file is missing but its sidecar exists".to_string()));
            }
            Err(source) => return Err(RotError::io(&self.db_path, source)),
        };

        if actual != expected {
            let details = if expected.len() == STORE_DIGEST_HEX_LEN {
                "SHA-512 of the store differs from the sidecar, the store might be corrupt"
                    .to_string()
            } else {
                format!(
                    "SHA-512 of the store differs from the sidecar and the sidecar has a \
                     suspicious length ({} chars), the sidecar might be corrupt",
                    expected.len()
                )
            };
            return Err(self.failure(details));
        }

        tracing::info!(target: "rotwatch::store", path = %self.db_path.display(), "store integrity ok");
        Ok(IntegrityStatus::Verified)
    }

    /// Rewrite the sidecar if the store's digest changed. Returns whether it
    /// was rewritten.
    pub fn refresh(&self) -> Result<bool> {
        let current = sha512_file(&self.db_path).map_err(|source| RotError::io(&self.db_path, source))?;
        if self.read_sidecar()?.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }
        self.write_sidecar(&current)?;
        tracing::info!(target: "rotwatch::store", path = %self.sidecar_path.display(), "updated integrity sidecar");
        Ok(true)
    }

    fn read_sidecar(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.sidecar_path) {
            Ok(raw) => Ok(Some(raw.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            // Non-UTF-8 content can never equal a hex digest.
            Err(err) if err.kind() == io::ErrorKind::InvalidData => Ok(Some(String::new())),
            Err(source) => Err(RotError::io(&self.sidecar_path, source)),
        }
    }

    /// Write via a temp file in the same directory, then rename into place.
    fn write_sidecar(&self, digest: &str) -> Result<()> {
        let dir = self
            .sidecar_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|source| RotError::io(dir, source))?;
        tmp.write_all(digest.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| RotError::io(tmp.path(), source))?;
        tmp.persist(&self.sidecar_path)
            .map_err(|err| RotError::io(&self.sidecar_path, err.error))?;
        Ok(())
    }

    fn failure(&self, details: String) -> RotError {
        tracing::error!(
            target: "rotwatch::store",
            path = %self.db_path.display(),
            sidecar = %self.sidecar_path.display(),
            %details,
            "store integrity check failed; delete the sidecar to continue anyway"
        );
        RotError::IntegrityFailed {
            path: self.db_path.clone(),
            details,
        }
    }
}
