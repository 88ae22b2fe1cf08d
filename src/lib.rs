#![forbid(unsafe_code)]

//! rotwatch: a file-integrity monitor that detects bitrot.
//!
//! Each run fingerprints every regular file under a root directory and
//! reconciles the result with a SQLite store kept inside that root:
//! 1. **Edits** (content and mtime changed) refresh the stored fingerprint
//! 2. **Renames** (known content at a new path, old path gone) move the record
//! 3. **Bitrot** (content changed, mtime did not) is reported and never
//!    overwritten
//!
//! The store itself is guarded by a SHA-512 sidecar checked before every run.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use rotwatch::prelude::*;
//!
//! let config = Config::load(None)?;
//! let report = Reconciler::new(".", &config).run(&RunOptions::default())?;
//! print!("{}", report.render(config.output.verbosity));
//! # Ok::<(), RotError>(())
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use rotwatch::store::stable_sum;
//! use rotwatch::scanner::walker::{DirectoryWalker, WalkerConfig};
//! ```

pub mod prelude;

pub mod core;
pub mod hashing;
pub mod reconcile;
pub mod scanner;
pub mod store;
