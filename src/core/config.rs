//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, RotError};
use crate::core::paths::Normalization;

/// Block size in HFS+, or four times the block size in ext4.
pub const DEFAULT_CHUNK_SIZE: usize = 16_384;

/// Default minimum seconds between store commits during a run.
pub const DEFAULT_COMMIT_INTERVAL_SECS: f64 = 300.0;

/// Full rotwatch configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub store: StoreConfig,
    pub output: OutputConfig,
    /// Where this config was loaded from (not serialized).
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// Scanner, hash pool, and commit-batching knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Bytes read per chunk while hashing.
    pub chunk_size: usize,
    /// Hash worker threads. Use 1 on slow rotational disks.
    pub workers: usize,
    /// Directory walker threads.
    pub walk_threads: usize,
    /// Minimum seconds between store commits (0 commits after every mutation).
    pub commit_interval_secs: f64,
    /// Hash symlinked files through the link and ignore placeholder attributes.
    pub follow_links: bool,
    /// Glob patterns matched against every path component.
    pub exclude: Vec<String>,
    /// Optional newline-delimited file of additional exclude patterns.
    pub exclude_file: Option<PathBuf>,
    /// Optional newline-delimited list of files to check instead of walking.
    pub file_list: Option<PathBuf>,
    /// Unicode normalization applied to store keys.
    pub normalization: Normalization,
}

/// Store and sidecar naming inside the scanned root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub db_file_name: String,
    pub sidecar_file_name: String,
}

/// Reporting behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// 0 = errors only, 1 = summary, 2 = full listings.
    pub verbosity: u8,
    /// Render a progress line while hashing.
    pub progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: cpus,
            walk_threads: cpus.saturating_div(2).max(1),
            commit_interval_secs: DEFAULT_COMMIT_INTERVAL_SECS,
            follow_links: false,
            exclude: Vec::new(),
            exclude_file: None,
            file_list: None,
            normalization: Normalization::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_file_name: ".bitrot.db".to_string(),
            sidecar_file_name: ".bitrot.sha512".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbosity: 1,
            progress: true,
        }
    }
}

impl StoreConfig {
    /// Store database path inside `root`.
    #[must_use]
    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(&self.db_file_name)
    }

    /// Integrity sidecar path inside `root`.
    #[must_use]
    pub fn sidecar_path(&self, root: &Path) -> PathBuf {
        root.join(&self.sidecar_file_name)
    }

    /// File names the scanner must never track: the store, its rollback
    /// journal, and the sidecar.
    #[must_use]
    pub fn reserved_names(&self) -> Vec<String> {
        vec![
            self.db_file_name.clone(),
            format!("{}-journal", self.db_file_name),
            self.sidecar_file_name.clone(),
        ]
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                tracing::warn!(
                    target: "rotwatch::config",
                    "HOME not set, falling back to /tmp for the config path"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        home_dir.join(".config").join("rotwatch").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| RotError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(RotError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = Some(path_buf);
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_patterns();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// Uses FNV-1a for cross-process-stable hashing (no `DefaultHasher`
    /// whose seed may vary across Rust releases).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Effective exclude patterns: inline patterns plus the exclude file.
    pub fn exclude_patterns(&self) -> Result<Vec<String>> {
        let mut patterns = self.scan.exclude.clone();
        if let Some(path) = &self.scan.exclude_file {
            patterns.extend(read_pattern_list(path)?);
        }
        Ok(patterns)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ROT_SCAN_CHUNK_SIZE") {
            self.scan.chunk_size = parse_env("ROT_SCAN_CHUNK_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("ROT_SCAN_WORKERS") {
            self.scan.workers = parse_env("ROT_SCAN_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("ROT_SCAN_WALK_THREADS") {
            self.scan.walk_threads = parse_env("ROT_SCAN_WALK_THREADS", &raw)?;
        }
        if let Some(raw) = lookup("ROT_SCAN_COMMIT_INTERVAL_SECS") {
            self.scan.commit_interval_secs = parse_env("ROT_SCAN_COMMIT_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("ROT_SCAN_FOLLOW_LINKS") {
            self.scan.follow_links = parse_env("ROT_SCAN_FOLLOW_LINKS", &raw)?;
        }
        if let Some(raw) = lookup("ROT_SCAN_EXCLUDE_FILE") {
            self.scan.exclude_file = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ROT_SCAN_FILE_LIST") {
            self.scan.file_list = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("ROT_OUTPUT_VERBOSITY") {
            self.output.verbosity = parse_env("ROT_OUTPUT_VERBOSITY", &raw)?;
        }
        if let Some(raw) = lookup("ROT_OUTPUT_PROGRESS") {
            self.output.progress = parse_env("ROT_OUTPUT_PROGRESS", &raw)?;
        }
        Ok(())
    }

    /// Drop blank patterns and trailing separators so `build/` matches the
    /// `build` component.
    fn normalize_patterns(&mut self) {
        self.scan.exclude = self
            .scan
            .exclude
            .iter()
            .map(|p| p.trim_end_matches(['/', '\\']).to_string())
            .filter(|p| !p.is_empty())
            .collect();
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.scan.chunk_size == 0 {
            return Err(RotError::InvalidConfig {
                details: "scan.chunk_size must be >= 1".to_string(),
            });
        }
        if self.scan.workers == 0 {
            return Err(RotError::InvalidConfig {
                details: "scan.workers must be >= 1".to_string(),
            });
        }
        if self.scan.walk_threads == 0 {
            return Err(RotError::InvalidConfig {
                details: "scan.walk_threads must be >= 1".to_string(),
            });
        }
        let interval = self.scan.commit_interval_secs;
        if !interval.is_finite() || interval < 0.0 {
            return Err(RotError::InvalidConfig {
                details: format!("scan.commit_interval_secs must be finite and >= 0, got {interval}"),
            });
        }
        if self.output.verbosity > 2 {
            return Err(RotError::InvalidConfig {
                details: format!("output.verbosity must be 0, 1 or 2, got {}", self.output.verbosity),
            });
        }
        if self.store.db_file_name.is_empty() || self.store.sidecar_file_name.is_empty() {
            return Err(RotError::InvalidConfig {
                details: "store file names must not be empty".to_string(),
            });
        }
        if self.store.db_file_name == self.store.sidecar_file_name {
            return Err(RotError::InvalidConfig {
                details: "store.db_file_name and store.sidecar_file_name must differ".to_string(),
            });
        }
        for pattern in &self.scan.exclude {
            crate::scanner::ignore::validate_glob_pattern(pattern)?;
        }
        Ok(())
    }
}

/// Read a newline-delimited list (exclude patterns or file paths).
///
/// Line endings are stripped; blank lines are skipped.
pub fn read_pattern_list(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path).map_err(|source| RotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_pattern_list(&raw))
}

pub(crate) fn parse_pattern_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| RotError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
