//! Reconciliation engine: the coordinator of a run.
//!
//! One run, in order:
//! 1. integrity check of the store against its sidecar (fatal on mismatch)
//! 2. load stored paths and the hash index
//! 3. scan the tree (or the explicit file list)
//! 4. hash every file in the pool, reconciling results in completion order
//! 5. delete records never observed, final commit, vacuum, sidecar refresh
//!
//! Per-file read failures are contained to that file, and corruption never
//! stops bookkeeping; it is raised as [`RotError::CorruptionFound`] only
//! after step 5.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::config::{Config, read_pattern_list};
use crate::core::errors::{Result, RotError};
use crate::core::paths::resolve_absolute_path;
use crate::hashing::pool::{FileDigest, HashJob, HashPool};
use crate::reconcile::commit::CommitPolicy;
use crate::reconcile::outcome::{AmbiguousRename, CorruptionRecord, Rename, RunReport, ScanOutcome};
use crate::reconcile::progress::{Progress, TerminalProgress};
use crate::reconcile::rename::{self, HashIndex, RenameDecision};
use crate::scanner::availability::{AvailabilityProbe, PlatformProbe};
use crate::scanner::file_list::scan_file_list;
use crate::scanner::ignore::{IgnoreRules, escape_glob};
use crate::scanner::walker::{DirectoryWalker, ScanSet, WalkerConfig};
use crate::store::database::{FileRecord, Store};
use crate::store::integrity::IntegrityGuard;

/// Per-run switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Verify against a throwaway copy of the store; nothing on disk changes.
    pub test: bool,
    /// Check exactly these paths instead of walking the tree. Takes
    /// precedence over `scan.file_list` from the config.
    pub file_list: Option<Vec<String>>,
}

impl RunOptions {
    pub fn test() -> Self {
        Self {
            test: true,
            file_list: None,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc>>;

enum ProgressSink {
    Silent,
    Terminal(TerminalProgress),
    Custom(Box<dyn FnMut(&Progress<'_>)>),
}

impl ProgressSink {
    fn report(&mut self, progress: &Progress<'_>) {
        match self {
            Self::Silent => {}
            Self::Terminal(term) => term.report(progress),
            Self::Custom(callback) => callback(progress),
        }
    }

    fn finish(&self) {
        if let Self::Terminal(term) = self {
            term.finish();
        }
    }
}

/// Mutable bookkeeping owned by the coordinator for one run.
struct RunState {
    /// Stored paths not yet observed; whatever is left at the end is deleted.
    missing: BTreeSet<String>,
    index: HashIndex,
    observed: HashSet<String>,
    outcome: ScanOutcome,
    bytes_read: u64,
}

/// Runs scans of one root directory.
pub struct Reconciler {
    root: PathBuf,
    config: Config,
    progress: ProgressSink,
    clock: Clock,
    probe: Arc<dyn AvailabilityProbe>,
}

impl Reconciler {
    /// Reconciler for `root` using `config`. The root is made absolute so
    /// absolute file-list entries key the same way as walked files. A
    /// terminal progress line is drawn on stderr when `output.progress` is set
    /// and verbosity is above 0.
    pub fn new(root: impl AsRef<Path>, config: &Config) -> Self {
        let progress = if config.output.progress && config.output.verbosity > 0 {
            ProgressSink::Terminal(TerminalProgress::stderr())
        } else {
            ProgressSink::Silent
        };
        Self {
            root: resolve_absolute_path(root.as_ref()),
            config: config.clone(),
            progress,
            clock: Box::new(Utc::now),
            probe: Arc::new(PlatformProbe),
        }
    }

    /// Replace progress rendering with `callback`, called after each hashed file.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Progress<'_>) + 'static,
    {
        self.progress = ProgressSink::Custom(Box::new(callback));
        self
    }

    /// Replace the wall clock used for verification timestamps.
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the placeholder-file probe.
    #[must_use]
    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: AvailabilityProbe + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute one run.
    pub fn run(&mut self, options: &RunOptions) -> Result<RunReport> {
        let started_at = self.timestamp();
        let guard = IntegrityGuard::for_root(&self.root, &self.config.store);
        let integrity = guard.check()?;

        let store = if options.test {
            Store::open_copy(guard.db_path())?
        } else {
            Store::open(guard.db_path())?
        };

        let scan = self.scan(options)?;
        let mut state = RunState {
            missing: store.all_paths()?,
            index: HashIndex::from_pairs(store.hash_pairs()?),
            observed: scan.keys(),
            outcome: ScanOutcome::default(),
            bytes_read: 0,
        };
        tracing::info!(
            target: "rotwatch::reconcile",
            root = %self.root.display(),
            files = scan.len(),
            bytes = scan.total_size,
            stored = state.missing.len(),
            test = options.test,
            "scan complete, hashing"
        );

        let mut sidecar_updated = false;
        let processed = self.process_results(&store, &guard, &scan, &mut state, options, &mut sidecar_updated);
        self.progress.finish();
        if let Err(err) = processed {
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(target: "rotwatch::reconcile", error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }

        for path in &state.missing {
            store.delete(path)?;
        }
        store.commit()?;
        if !options.test {
            store.vacuum()?;
        }
        let entries_in_store = store.count()?;
        drop(store);

        if !options.test {
            sidecar_updated |= guard.refresh()?;
        }

        let mut outcome = state.outcome;
        outcome.missing = state.missing.into_iter().collect();
        outcome.sort();

        let report = RunReport {
            outcome,
            total_bytes: scan.total_size,
            bytes_read: state.bytes_read,
            entries_in_store,
            test_mode: options.test,
            integrity: Some(integrity),
            sidecar_updated,
            started_at,
            finished_at: self.timestamp(),
        };
        let o = &report.outcome;
        tracing::info!(
            target: "rotwatch::reconcile",
            entries = report.entries_in_store,
            new = o.new.len(),
            updated = o.updated.len(),
            renamed = o.renamed.len(),
            missing = o.missing.len(),
            errors = o.errors.len(),
            unavailable = o.soft_failures,
            "run finished"
        );

        if report.outcome.errors.is_empty() {
            Ok(report)
        } else {
            Err(RotError::CorruptionFound {
                paths: report.outcome.error_paths(),
                report: Box::new(report),
            })
        }
    }

    fn scan(&self, options: &RunOptions) -> Result<ScanSet> {
        let reserved: Vec<String> = self
            .config
            .store
            .reserved_names()
            .iter()
            .map(|name| escape_glob(name))
            .collect();
        let scan_cfg = &self.config.scan;

        let file_list = match (&options.file_list, &scan_cfg.file_list) {
            (Some(entries), _) => Some(entries.clone()),
            (None, Some(path)) => Some(read_pattern_list(path)?),
            (None, None) => None,
        };
        if let Some(entries) = file_list {
            let reserved = IgnoreRules::new(&reserved)?;
            return Ok(scan_file_list(&self.root, &entries, &reserved, scan_cfg.normalization));
        }

        let mut patterns = self.config.exclude_patterns()?;
        patterns.extend(reserved);
        let walker = DirectoryWalker::new(
            WalkerConfig {
                root: self.root.clone(),
                parallelism: scan_cfg.walk_threads,
                follow_links: scan_cfg.follow_links,
                normalization: scan_cfg.normalization,
            },
            IgnoreRules::new(&patterns)?,
        )
        .with_shared_probe(Arc::clone(&self.probe));
        walker.walk()
    }

    fn process_results(
        &mut self,
        store: &Store,
        guard: &IntegrityGuard,
        scan: &ScanSet,
        state: &mut RunState,
        options: &RunOptions,
        sidecar_updated: &mut bool,
    ) -> Result<()> {
        let jobs = scan
            .files
            .iter()
            .map(|file| HashJob {
                path: file.path.clone(),
                key: file.key.clone(),
            })
            .collect();
        let pool = HashPool::new(self.config.scan.workers, self.config.scan.chunk_size);
        let results = pool.submit_all(jobs)?;
        let mut commits = CommitPolicy::from_secs_f64(self.config.scan.commit_interval_secs);

        store.begin()?;
        for result in results {
            let digest = match result {
                Ok(digest) => digest,
                Err(err) => {
                    if err.is_soft() {
                        tracing::warn!(target: "rotwatch::hashing", error = %err, "skipping file");
                        state.outcome.soft_failures += 1;
                    } else {
                        tracing::error!(target: "rotwatch::hashing", error = %err, "skipping unreadable file");
                        state.outcome.unreadable.push(err.key().to_string());
                    }
                    // Still on disk: keep the last known good record.
                    if !err.is_vanished() {
                        state.missing.remove(err.key());
                    }
                    continue;
                }
            };

            state.bytes_read += digest.size_bytes;
            self.progress.report(&Progress {
                current_bytes: state.bytes_read,
                total_bytes: scan.total_size,
                path: &digest.key,
            });

            let mutated = if state.missing.remove(&digest.key) {
                self.reconcile_known(store, &digest, &mut state.outcome)?
            } else {
                self.reconcile_unknown(store, &digest, state)?;
                true
            };

            if mutated && commits.is_due(Instant::now()) {
                store.commit()?;
                commits.record_commit(Instant::now());
                tracing::debug!(target: "rotwatch::store", "committed batch");
                if !options.test {
                    *sidecar_updated |= guard.refresh()?;
                }
                store.begin()?;
            }
        }
        Ok(())
    }

    /// Path the store already tracks. Returns whether the store changed.
    fn reconcile_known(&self, store: &Store, digest: &FileDigest, outcome: &mut ScanOutcome) -> Result<bool> {
        let Some(stored) = store.get(&digest.key)? else {
            tracing::warn!(
                target: "rotwatch::reconcile",
                path = %digest.key,
                "path disappeared from the store while running"
            );
            return Ok(false);
        };

        if stored.mtime != digest.mtime {
            store.update_content(&digest.key, digest.mtime, &digest.hash, &self.timestamp())?;
            outcome.updated.push(digest.key.clone());
            return Ok(true);
        }

        if stored.hash != digest.hash {
            tracing::error!(
                target: "rotwatch::reconcile",
                path = %digest.key,
                expected = %stored.hash,
                actual = %digest.hash,
                last_verified = %stored.timestamp,
                "hash mismatch"
            );
            outcome.errors.push(CorruptionRecord {
                path: digest.key.clone(),
                expected: stored.hash,
                actual: digest.hash.clone(),
                last_verified: stored.timestamp,
            });
        } else {
            outcome.unchanged += 1;
        }
        Ok(false)
    }

    /// Path the store does not know: either a rename target or new content.
    fn reconcile_unknown(&self, store: &Store, digest: &FileDigest, state: &mut RunState) -> Result<()> {
        let now = self.timestamp();
        if let RenameDecision::Rename {
            source,
            other_candidates,
        } = rename::resolve(&mut state.index, &state.observed, &digest.hash)
        {
            if store.rename(&source, &digest.key, digest.mtime, &now)? {
                tracing::debug!(target: "rotwatch::reconcile", from = %source, to = %digest.key, "renamed");
                state.missing.remove(&source);
                if !other_candidates.is_empty() {
                    state.outcome.ambiguous_renames.push(AmbiguousRename {
                        chosen: source.clone(),
                        to: digest.key.clone(),
                        other_candidates,
                    });
                }
                state.outcome.renamed.push(Rename {
                    from: source,
                    to: digest.key.clone(),
                });
                return Ok(());
            }
            tracing::warn!(
                target: "rotwatch::reconcile",
                path = %source,
                "rename source disappeared from the store while running"
            );
        }

        store.insert(&FileRecord {
            path: digest.key.clone(),
            mtime: digest.mtime,
            hash: digest.hash.clone(),
            timestamp: now,
        })?;
        state.outcome.new.push(digest.key.clone());
        Ok(())
    }

    fn timestamp(&self) -> String {
        (self.clock)().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    use chrono::TimeZone;
    use filetime::{FileTime, set_file_mtime};

    fn quiet_config() -> Config {
        let mut cfg = Config::default();
        cfg.output.progress = false;
        cfg.scan.workers = 2;
        cfg.scan.walk_threads = 2;
        cfg
    }

    fn write(root: &Path, name: &str, body: &[u8], mtime: i64) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, body).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_run_records_everything_as_new() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.txt", b"alpha", 1_000);
        write(tmp.path(), "sub/b.txt", b"beta", 1_000);

        let report = Reconciler::new(tmp.path(), &quiet_config())
            .with_clock(fixed_clock)
            .run(&RunOptions::default())
            .unwrap();
        assert_eq!(report.outcome.new, vec!["a.txt", "sub/b.txt"]);
        assert_eq!(report.entries_in_store, 2);
        assert_eq!(report.total_bytes, 9);
        assert!(report.sidecar_updated);
        assert!(tmp.path().join(".bitrot.sha512").exists());

        let store = Store::open(&tmp.path().join(".bitrot.db")).unwrap();
        let row = store.get("a.txt").unwrap().unwrap();
        assert_eq!(row.timestamp, "2026-03-01T12:00:00Z");
        assert_eq!(row.mtime, 1_000);
    }

    #[test]
    fn store_files_are_never_tracked() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.txt", b"alpha", 1_000);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();
        let second = reconciler.run(&RunOptions::default()).unwrap();
        assert!(second.outcome.is_clean());
        assert_eq!(second.entries_in_store, 1);
        assert_eq!(second.outcome.unchanged, 1);
    }

    #[test]
    fn corruption_keeps_stored_row_and_finishes_bookkeeping() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "keep.bin", b"original", 5_000);
        write(tmp.path(), "gone.bin", b"bye", 5_000);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();

        write(tmp.path(), "keep.bin", b"flipped!", 5_000);
        fs::remove_file(tmp.path().join("gone.bin")).unwrap();
        write(tmp.path(), "fresh.bin", b"new", 6_000);
        let err = reconciler.run(&RunOptions::default()).unwrap_err();

        assert_eq!(err.exit_code(), 1);
        let RotError::CorruptionFound { paths, report } = err else {
            panic!("expected corruption");
        };
        assert_eq!(paths, vec!["keep.bin"]);
        assert_eq!(report.outcome.missing, vec!["gone.bin"]);
        assert_eq!(report.outcome.new, vec!["fresh.bin"]);
        assert_eq!(report.entries_in_store, 2);

        let store = Store::open(&tmp.path().join(".bitrot.db")).unwrap();
        let row = store.get("keep.bin").unwrap().unwrap();
        assert_eq!(row.hash, report.outcome.errors[0].expected);
        assert!(store.get("gone.bin").unwrap().is_none());
    }

    #[test]
    fn present_duplicate_is_never_the_rename_source() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "one.txt", b"same", 1_000);
        write(tmp.path(), "two.txt", b"same", 1_000);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();

        fs::remove_file(tmp.path().join("two.txt")).unwrap();
        write(tmp.path(), "three.txt", b"same", 2_000);
        let report = reconciler.run(&RunOptions::default()).unwrap();
        // two.txt is absent, so it is the rename source; one.txt stays put.
        assert_eq!(
            report.outcome.renamed,
            vec![Rename {
                from: "two.txt".to_string(),
                to: "three.txt".to_string(),
            }]
        );
        assert!(report.outcome.new.is_empty());
        assert!(report.outcome.missing.is_empty());

        write(tmp.path(), "four.txt", b"same", 3_000);
        let report = reconciler.run(&RunOptions::default()).unwrap();
        assert_eq!(report.outcome.new, vec!["four.txt"]);
        assert!(report.outcome.renamed.is_empty());
        assert_eq!(report.entries_in_store, 3);
    }

    #[test]
    fn ambiguous_rename_is_noted() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a", b"dup", 1_000);
        write(tmp.path(), "b", b"dup", 1_000);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();

        fs::remove_file(tmp.path().join("a")).unwrap();
        fs::remove_file(tmp.path().join("b")).unwrap();
        write(tmp.path(), "c", b"dup", 2_000);
        let report = reconciler.run(&RunOptions::default()).unwrap();
        assert_eq!(report.outcome.renamed[0].from, "a");
        assert_eq!(report.outcome.missing, vec!["b"]);
        assert_eq!(report.outcome.ambiguous_renames.len(), 1);
        assert_eq!(report.outcome.ambiguous_renames[0].other_candidates, vec!["b"]);
    }

    #[test]
    fn progress_callback_sees_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a", b"12", 1);
        write(tmp.path(), "b", b"345", 1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        Reconciler::new(tmp.path(), &quiet_config())
            .with_progress(move |p| sink.borrow_mut().push((p.current_bytes, p.total_bytes)))
            .run(&RunOptions::default())
            .unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last(), Some(&(5, 5)));
    }

    #[test]
    fn explicit_file_list_replaces_walk() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "listed.txt", b"l", 1);
        write(tmp.path(), "unlisted.txt", b"u", 1);
        let report = Reconciler::new(tmp.path(), &quiet_config())
            .run(&RunOptions {
                test: false,
                file_list: Some(vec!["listed.txt".to_string(), "ghost.txt".to_string()]),
            })
            .unwrap();
        assert_eq!(report.outcome.new, vec!["listed.txt"]);
        assert_eq!(report.outcome.soft_failures, 1);
    }

    #[test]
    fn absolute_file_list_entries_key_relative_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "sub/x.txt", b"x", 1);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        let absolute = reconciler.root().join("sub/x.txt");
        let report = reconciler
            .run(&RunOptions {
                test: false,
                file_list: Some(vec![absolute.display().to_string()]),
            })
            .unwrap();
        assert_eq!(report.outcome.new, vec!["sub/x.txt"]);
    }

    #[test]
    fn unreadable_entry_does_not_stop_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "good.txt", b"fine", 1);
        fs::create_dir(tmp.path().join("adir")).unwrap();
        let mut cfg = quiet_config();
        cfg.scan.commit_interval_secs = 3_600.0;
        let report = Reconciler::new(tmp.path(), &cfg)
            .run(&RunOptions {
                test: false,
                file_list: Some(vec!["good.txt".to_string(), "adir".to_string()]),
            })
            .unwrap();

        assert_eq!(report.outcome.new, vec!["good.txt"]);
        let skipped = report.outcome.unreadable.len() as u64 + report.outcome.soft_failures;
        assert_eq!(skipped, 1);
        #[cfg(unix)]
        assert_eq!(report.outcome.unreadable, vec!["adir"]);

        let store = Store::open(&tmp.path().join(".bitrot.db")).unwrap();
        assert!(store.get("good.txt").unwrap().is_some());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn present_but_unreadable_file_keeps_its_record() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "x", b"precious", 1);
        write(tmp.path(), "other", b"o", 1);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();
        let before = Store::open(&tmp.path().join(".bitrot.db"))
            .unwrap()
            .get("x")
            .unwrap()
            .unwrap();

        // `x` is still on disk but its bytes cannot be read back.
        fs::remove_file(tmp.path().join("x")).unwrap();
        fs::create_dir(tmp.path().join("x")).unwrap();
        let report = reconciler
            .run(&RunOptions {
                test: false,
                file_list: Some(vec!["x".to_string(), "other".to_string()]),
            })
            .unwrap();
        assert!(report.outcome.missing.is_empty());
        assert_eq!(report.outcome.unchanged, 1);
        assert_eq!(report.entries_in_store, 2);

        let after = Store::open(&tmp.path().join(".bitrot.db"))
            .unwrap()
            .get("x")
            .unwrap();
        assert_eq!(after, Some(before));
    }

    #[test]
    fn vanished_listed_file_is_still_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "gone", b"g", 1);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();

        fs::remove_file(tmp.path().join("gone")).unwrap();
        let report = reconciler
            .run(&RunOptions {
                test: false,
                file_list: Some(vec!["gone".to_string()]),
            })
            .unwrap();
        assert_eq!(report.outcome.soft_failures, 1);
        assert_eq!(report.outcome.missing, vec!["gone"]);
        assert_eq!(report.entries_in_store, 0);
    }

    #[cfg(unix)]
    #[test]
    fn permission_denied_file_keeps_its_record() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "locked", b"secret", 1);
        let mut reconciler = Reconciler::new(tmp.path(), &quiet_config());
        reconciler.run(&RunOptions::default()).unwrap();

        let path = tmp.path().join("locked");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read(&path).is_ok() {
            // Privileged users read through mode bits.
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
            return;
        }
        let report = reconciler.run(&RunOptions::default()).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(report.outcome.soft_failures, 1);
        assert!(report.outcome.missing.is_empty());
        assert_eq!(report.entries_in_store, 1);
    }
}
