//! Explicit file-list mode: check a caller-supplied set of paths instead of
//! walking the tree.
//!
//! Listed paths are trusted as-is. No exclude patterns apply except the
//! store's own reserved files, and entries that cannot be stat'ed still reach
//! the hash pool (where they soft-fail) but contribute 0 bytes to the total.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::paths::{Normalization, store_key};
use crate::scanner::ignore::IgnoreRules;
use crate::scanner::walker::{ScanSet, ScannedFile};

/// Build a scan set from explicit `entries`, resolved against `root`.
pub fn scan_file_list<S: AsRef<str>>(
    root: &Path,
    entries: &[S],
    reserved: &IgnoreRules,
    normalization: Normalization,
) -> ScanSet {
    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.as_ref();
        if entry.is_empty() {
            continue;
        }
        let listed = Path::new(entry);
        let path: PathBuf = if listed.is_absolute() {
            listed.to_path_buf()
        } else {
            root.join(listed)
        };

        if reserved.is_ignored(listed) {
            tracing::debug!(target: "rotwatch::scanner", path = %path.display(), "ignoring (store file)");
            continue;
        }

        let Some(key) = store_key(root, &path, normalization) else {
            tracing::warn!(target: "rotwatch::scanner", path = %path.display(), "cannot decode file name");
            continue;
        };

        let size_bytes = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::warn!(
                    target: "rotwatch::scanner",
                    path = %path.display(),
                    error = %err,
                    "listed file cannot be stat'ed"
                );
                0
            }
        };

        files.push(ScannedFile {
            path,
            key,
            size_bytes,
        });
    }
    ScanSet::from_files(files)
}
