//! Parallel directory walker that enumerates every eligible regular file.
//!
//! The walker is the first stage of a run: it produces the set of files to
//! hash plus their summed size. Eligibility rules:
//! - regular files only (no directories, FIFOs, sockets, devices)
//! - symlinks are skipped unless `follow_links` is set; symlinked
//!   directories are never descended
//! - placeholder files whose content is not local are skipped unless
//!   `follow_links` is set
//! - any path component matching an exclude pattern prunes the entry
//!
//! Benign races (entry vanished, permission denied) are skipped with a
//! warning. Any other OS error aborts the walk.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::core::errors::{Result, RotError};
use crate::core::paths::{Normalization, store_key};
use crate::scanner::availability::{AvailabilityProbe, PlatformProbe};
use crate::scanner::ignore::IgnoreRules;

/// Walker configuration derived from `ScanConfig`.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub root: PathBuf,
    pub parallelism: usize,
    pub follow_links: bool,
    pub normalization: Normalization,
}

/// One file selected for hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path used to open the file.
    pub path: PathBuf,
    /// Normalized root-relative store key.
    pub key: String,
    pub size_bytes: u64,
}

/// Result of a scan: eligible files ordered by key, plus their summed size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSet {
    pub files: Vec<ScannedFile>,
    pub total_size: u64,
}

impl ScanSet {
    /// Build a set from unordered files. Sorts by key and drops duplicate keys
    /// (two spellings normalizing to the same key are tracked once, keeping
    /// the smallest path regardless of discovery order).
    pub fn from_files(mut files: Vec<ScannedFile>) -> Self {
        files.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.path.cmp(&b.path)));
        files.dedup_by(|later, earlier| {
            if later.key == earlier.key {
                tracing::warn!(
                    target: "rotwatch::scanner",
                    kept = %earlier.path.display(),
                    dropped = %later.path.display(),
                    "two paths normalize to the same key"
                );
                true
            } else {
                false
            }
        });
        let total_size = files.iter().map(|f| f.size_bytes).sum();
        Self { files, total_size }
    }

    /// Every key observed in this scan.
    pub fn keys(&self) -> HashSet<String> {
        self.files.iter().map(|f| f.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Message from walker threads to the collector.
#[derive(Debug)]
pub enum WalkEvent {
    File(ScannedFile),
    Fatal(RotError),
}

/// Shared state handed to each walker thread.
struct WalkShared {
    config: WalkerConfig,
    ignore: Arc<IgnoreRules>,
    probe: Arc<dyn AvailabilityProbe>,
    in_flight: AtomicUsize,
    aborted: AtomicBool,
}

/// Parallel directory walker.
///
/// Safety invariants:
/// - Never descends through a symlink, so link cycles cannot occur
/// - Never silently drops a directory: every queued directory is processed
///   or the walk reports a fatal error
pub struct DirectoryWalker {
    config: WalkerConfig,
    ignore: Arc<IgnoreRules>,
    probe: Arc<dyn AvailabilityProbe>,
}

impl DirectoryWalker {
    pub fn new(config: WalkerConfig, ignore: IgnoreRules) -> Self {
        Self {
            config,
            ignore: Arc::new(ignore),
            probe: Arc::new(PlatformProbe),
        }
    }

    /// Replace the platform placeholder probe.
    #[must_use]
    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: AvailabilityProbe + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    /// Share an already-boxed probe.
    #[must_use]
    pub fn with_shared_probe(mut self, probe: Arc<dyn AvailabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Walk the whole tree and collect the eligible files.
    ///
    /// The first fatal error aborts the walk and is returned.
    pub fn walk(&self) -> Result<ScanSet> {
        let rx = self.stream()?;
        let mut files = Vec::new();
        let mut fatal = None;
        for event in rx {
            match event {
                WalkEvent::File(file) => files.push(file),
                WalkEvent::Fatal(err) => {
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
            }
        }
        match fatal {
            Some(err) => Err(err),
            None => Ok(ScanSet::from_files(files)),
        }
    }

    /// Stream events as they are discovered. The walk runs in background threads.
    pub fn stream(&self) -> Result<channel::Receiver<WalkEvent>> {
        let root = &self.config.root;
        let meta = fs::metadata(root).map_err(|source| RotError::io(root, source))?;
        if !meta.is_dir() {
            return Err(RotError::io(
                root,
                io::Error::new(ErrorKind::InvalidInput, "scan root is not a directory"),
            ));
        }

        let parallelism = self.config.parallelism.max(1);
        // Unbounded work queue: a directory is never dropped for lack of room.
        let (work_tx, work_rx) = channel::unbounded::<PathBuf>();
        let (result_tx, result_rx) = channel::unbounded::<WalkEvent>();

        let shared = Arc::new(WalkShared {
            config: self.config.clone(),
            ignore: Arc::clone(&self.ignore),
            probe: Arc::clone(&self.probe),
            in_flight: AtomicUsize::new(1),
            aborted: AtomicBool::new(false),
        });
        let _ = work_tx.send(root.clone());

        for index in 0..parallelism {
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let result_tx = result_tx.clone();
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("rotwatch-walk-{index}"))
                .spawn(move || walker_thread(&work_rx, &work_tx, &result_tx, &shared))
                .map_err(|source| RotError::Runtime {
                    details: format!("failed to spawn walker thread: {source}"),
                })?;
        }

        Ok(result_rx)
    }
}

/// Worker thread: pulls directories, emits files, queues subdirectories.
fn walker_thread(
    work_rx: &channel::Receiver<PathBuf>,
    work_tx: &channel::Sender<PathBuf>,
    result_tx: &channel::Sender<WalkEvent>,
    shared: &WalkShared,
) {
    loop {
        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(dir_path) => {
                if !shared.aborted.load(Ordering::Acquire)
                    && let Err(err) = process_directory(&dir_path, work_tx, result_tx, shared)
                {
                    shared.aborted.store(true, Ordering::Release);
                    let _ = result_tx.send(WalkEvent::Fatal(err));
                }
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                if shared.in_flight.load(Ordering::Acquire) == 0 {
                    return;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Process one directory: emit eligible files, queue child directories.
fn process_directory(
    dir_path: &Path,
    work_tx: &channel::Sender<PathBuf>,
    result_tx: &channel::Sender<WalkEvent>,
    shared: &WalkShared,
) -> Result<()> {
    let config = &shared.config;
    let entries = match fs::read_dir(dir_path) {
        Ok(entries) => entries,
        Err(err) if is_benign(&err) => {
            tracing::warn!(target: "rotwatch::scanner", path = %dir_path.display(), error = %err, "skipping unreadable directory");
            return Ok(());
        }
        Err(source) => return Err(RotError::io(dir_path, source)),
    };

    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) if is_benign(&err) => {
                tracing::warn!(target: "rotwatch::scanner", path = %dir_path.display(), error = %err, "skipping directory entry");
                continue;
            }
            Err(source) => return Err(RotError::io(dir_path, source)),
        };

        let child_path = entry.path();
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(target: "rotwatch::scanner", path = %child_path.display(), "cannot decode file name");
            continue;
        };

        if let Some(pattern) = shared.ignore.matching_pattern(name) {
            tracing::debug!(target: "rotwatch::scanner", path = %child_path.display(), pattern, "ignoring (in exclude list)");
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) if is_benign(&err) => continue,
            Err(source) => return Err(RotError::io(&child_path, source)),
        };

        if file_type.is_dir() {
            shared.in_flight.fetch_add(1, Ordering::AcqRel);
            if work_tx.send(child_path).is_err() {
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                return Err(RotError::ChannelClosed { component: "walker" });
            }
            continue;
        }

        if file_type.is_symlink() && !config.follow_links {
            tracing::debug!(target: "rotwatch::scanner", path = %child_path.display(), "ignoring (symlink)");
            continue;
        }

        let meta = match metadata_for_path(&child_path, config.follow_links) {
            Ok(meta) => meta,
            Err(err) if is_benign(&err) => {
                tracing::warn!(target: "rotwatch::scanner", path = %child_path.display(), error = %err, "skipping file");
                continue;
            }
            Err(source) => return Err(RotError::io(&child_path, source)),
        };

        if !meta.is_file() {
            tracing::debug!(target: "rotwatch::scanner", path = %child_path.display(), "ignoring (not regular file)");
            continue;
        }

        if !config.follow_links && !shared.probe.is_content_local(&child_path, &meta) {
            tracing::debug!(target: "rotwatch::scanner", path = %child_path.display(), "ignoring (cloud-only)");
            continue;
        }

        let Some(key) = store_key(&config.root, &child_path, config.normalization) else {
            tracing::warn!(target: "rotwatch::scanner", path = %child_path.display(), "cannot decode file name");
            continue;
        };

        let _ = result_tx.send(WalkEvent::File(ScannedFile {
            path: child_path,
            key,
            size_bytes: meta.len(),
        }));
    }

    Ok(())
}

/// Errors that mean "this entry is gone or locked right now", not "the
/// filesystem is broken".
pub(crate) fn is_benign(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied)
}

fn metadata_for_path(path: &Path, follow_links: bool) -> io::Result<fs::Metadata> {
    if follow_links {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}
