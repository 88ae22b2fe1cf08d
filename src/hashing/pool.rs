//! Fixed-size hash worker pool.
//!
//! Workers are pure path-in, result-out units: they never touch the store.
//! The coordinator submits the whole job set up front and drains results in
//! completion order.

#![allow(missing_docs)]

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_channel as channel;
use thiserror::Error;

use crate::core::errors::{Result, RotError};
use crate::hashing::digest::digest_file;

/// One file to fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashJob {
    pub path: PathBuf,
    pub key: String,
}

/// Successful per-file result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Modification time in whole epoch seconds.
    pub mtime: i64,
    pub hash: String,
}

/// Per-file failure, tagged soft or hard.
#[derive(Debug, Error)]
pub enum FileError {
    /// The file vanished or became inaccessible between listing and hashing.
    #[error("`{key}` is currently unavailable for reading: {source}")]
    Unavailable {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other read failure, such as EIO from a failing sector.
    #[error("cannot compute hash of `{key}`: {source}")]
    Unreadable {
        key: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    fn classify(job: &HashJob, source: io::Error) -> Self {
        let key = job.key.clone();
        let path = job.path.clone();
        match source.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                Self::Unavailable { key, path, source }
            }
            _ => Self::Unreadable { key, path, source },
        }
    }

    /// Soft failures are counted; hard failures are listed as unreadable.
    /// Neither stops the run.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// The file no longer exists, as opposed to existing but refusing reads.
    #[must_use]
    pub fn is_vanished(&self) -> bool {
        matches!(self, Self::Unavailable { source, .. } if source.kind() == ErrorKind::NotFound)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Unavailable { key, .. } | Self::Unreadable { key, .. } => key,
        }
    }
}

pub type HashOutcome = std::result::Result<FileDigest, FileError>;

/// Stat and fingerprint a single file.
pub fn hash_one(job: &HashJob, chunk_size: usize) -> HashOutcome {
    let meta = fs::metadata(&job.path).map_err(|err| FileError::classify(job, err))?;
    let modified = meta.modified().map_err(|err| FileError::classify(job, err))?;
    let hash = digest_file(&job.path, chunk_size).map_err(|err| FileError::classify(job, err))?;
    Ok(FileDigest {
        key: job.key.clone(),
        path: job.path.clone(),
        size_bytes: meta.len(),
        mtime: DateTime::<Utc>::from(modified).timestamp(),
        hash,
    })
}

/// Thread pool that hashes a batch of jobs.
#[derive(Debug, Clone, Copy)]
pub struct HashPool {
    workers: usize,
    chunk_size: usize,
}

impl HashPool {
    pub fn new(workers: usize, chunk_size: usize) -> Self {
        Self {
            workers: workers.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Queue every job and start the workers.
    ///
    /// The returned receiver yields exactly one outcome per job, in completion
    /// order, and disconnects once all workers have exited. Dropping it early
    /// makes the workers stop after their current file.
    pub fn submit_all(&self, jobs: Vec<HashJob>) -> Result<channel::Receiver<HashOutcome>> {
        let worker_count = self.workers.min(jobs.len()).max(1);
        let (job_tx, job_rx) = channel::unbounded::<HashJob>();
        let (result_tx, result_rx) = channel::unbounded::<HashOutcome>();

        for job in jobs {
            job_tx
                .send(job)
                .map_err(|_| RotError::ChannelClosed { component: "hash pool" })?;
        }
        drop(job_tx);

        for index in 0..worker_count {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let chunk_size = self.chunk_size;
            thread::Builder::new()
                .name(format!("rotwatch-hash-{index}"))
                .spawn(move || worker_main(&job_rx, &result_tx, chunk_size))
                .map_err(|source| RotError::Runtime {
                    details: format!("failed to spawn hash worker: {source}"),
                })?;
        }

        Ok(result_rx)
    }
}

fn worker_main(
    job_rx: &channel::Receiver<HashJob>,
    result_tx: &channel::Sender<HashOutcome>,
    chunk_size: usize,
) {
    for job in job_rx {
        let outcome = hash_one(&job, chunk_size);
        if result_tx.send(outcome).is_err() {
            tracing::debug!(target: "rotwatch::hashing", "result receiver dropped, worker exiting");
            return;
        }
    }
}
