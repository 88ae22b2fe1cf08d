#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use filetime::{FileTime, set_file_mtime};
use rotwatch::core::config::Config;
use rotwatch::core::errors::Result;
use rotwatch::reconcile::{Reconciler, RunOptions, RunReport};
use rotwatch::store::{FileRecord, Store};
use tempfile::TempDir;

/// Scratch directory tree tracked by rotwatch.
pub struct TestTree {
    dir: TempDir,
    pub config: Config,
}

impl TestTree {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.output.progress = false;
        config.output.verbosity = 0;
        config.scan.workers = 2;
        config.scan.walk_threads = 2;
        config.scan.commit_interval_secs = 0.0;
        Self {
            dir: TempDir::new().expect("create temp tree"),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.store.db_path(self.root())
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.config.store.sidecar_path(self.root())
    }

    /// Write `body` to `name` and pin its mtime.
    pub fn write(&self, name: &str, body: &[u8], mtime: i64) {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, body).expect("write file");
        set_mtime(&path, mtime);
    }

    pub fn rename(&self, from: &str, to: &str) {
        fs::rename(self.path(from), self.path(to)).expect("rename file");
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.path(name)).expect("remove file");
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.root(), &self.config)
    }

    pub fn run(&self) -> Result<RunReport> {
        self.reconciler().run(&RunOptions::default())
    }

    pub fn run_test_mode(&self) -> Result<RunReport> {
        self.reconciler().run(&RunOptions::test())
    }

    /// Run and return the report even when corruption was found.
    pub fn run_report(&self) -> RunReport {
        match self.run() {
            Ok(report) => report,
            Err(err) => err
                .report()
                .cloned()
                .unwrap_or_else(|| panic!("run failed without a report: {err}")),
        }
    }

    pub fn record(&self, key: &str) -> Option<FileRecord> {
        Store::open_read_only(&self.db_path())
            .expect("open store")
            .get(key)
            .expect("query store")
    }

    pub fn store_bytes(&self) -> Vec<u8> {
        fs::read(self.db_path()).expect("read store")
    }
}

pub fn set_mtime(path: &Path, mtime: i64) {
    set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).expect("set mtime");
}
