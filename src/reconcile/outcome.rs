//! Per-run classification and the human-readable run report.

#![allow(missing_docs)]

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::errors::Result;
use crate::store::integrity::IntegrityStatus;

/// A record that moved from one path to another with identical content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// Hash mismatch on a file whose mtime did not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionRecord {
    pub path: String,
    pub expected: String,
    pub actual: String,
    /// Last time the expected hash was confirmed correct.
    pub last_verified: String,
}

/// A rename where more than one absent record carried the same content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousRename {
    pub chosen: String,
    pub to: String,
    pub other_candidates: Vec<String>,
}

/// Disjoint classification of every path a run touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub renamed: Vec<Rename>,
    pub missing: Vec<String>,
    pub errors: Vec<CorruptionRecord>,
    pub ambiguous_renames: Vec<AmbiguousRename>,
    /// Present files whose bytes could not be read this run. Their records
    /// are kept untouched.
    pub unreadable: Vec<String>,
    pub unchanged: u64,
    pub soft_failures: u64,
}

impl ScanOutcome {
    /// Sort every listing so reports are stable regardless of completion order.
    pub fn sort(&mut self) {
        self.new.sort();
        self.updated.sort();
        self.renamed.sort();
        self.missing.sort();
        self.errors.sort_by(|a, b| a.path.cmp(&b.path));
        self.ambiguous_renames.sort_by(|a, b| a.to.cmp(&b.to));
        self.unreadable.sort();
    }

    /// No bookkeeping deltas and no corruption.
    pub fn is_clean(&self) -> bool {
        self.new.is_empty()
            && self.updated.is_empty()
            && self.renamed.is_empty()
            && self.missing.is_empty()
            && self.errors.is_empty()
    }

    pub fn error_paths(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.path.clone()).collect()
    }
}

/// Everything a caller needs after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: ScanOutcome,
    /// Summed size of the scan set.
    pub total_bytes: u64,
    /// Bytes actually hashed (excludes soft failures).
    pub bytes_read: u64,
    pub entries_in_store: u64,
    pub test_mode: bool,
    pub integrity: Option<IntegrityStatus>,
    pub sidecar_updated: bool,
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    /// Text summary.
    ///
    /// Verbosity 0 prints only corruption lines; 1 adds the totals and a
    /// one-line count; 2 replaces the count with full listings.
    pub fn render(&self, verbosity: u8) -> String {
        let o = &self.outcome;
        let mut out = String::new();
        if verbosity > 0 {
            #[allow(clippy::cast_precision_loss)]
            let mib = self.total_bytes as f64 / 1024.0 / 1024.0;
            let _ = writeln!(
                out,
                "Finished. {mib:.2} MiB of data read. {} errors found.",
                o.errors.len()
            );
        }
        for err in &o.errors {
            let _ = writeln!(
                out,
                "error: hash mismatch for {}: expected {}, got {}. Last good hash checked on {}.",
                err.path, err.expected, err.actual, err.last_verified
            );
        }
        if verbosity > 0 {
            for path in &o.unreadable {
                let _ = writeln!(out, "warning: could not read {path}; record kept.");
            }
        }
        match verbosity {
            0 => {}
            1 => {
                let _ = writeln!(
                    out,
                    "{} entries in the database, {} new, {} updated, {} renamed, {} missing.",
                    self.entries_in_store,
                    o.new.len(),
                    o.updated.len(),
                    o.renamed.len(),
                    o.missing.len()
                );
            }
            _ => {
                let _ = writeln!(out, "{} entries in the database.", self.entries_in_store);
                list_paths(&mut out, "new", o.new.iter().map(|p| format!(" {p}")));
                list_paths(&mut out, "updated", o.updated.iter().map(|p| format!(" {p}")));
                list_paths(
                    &mut out,
                    "renamed",
                    o.renamed.iter().map(|r| format!(" from {} to {}", r.from, r.to)),
                );
                list_paths(&mut out, "missing", o.missing.iter().map(|p| format!(" {p}")));
                for amb in &o.ambiguous_renames {
                    let _ = writeln!(
                        out,
                        "note: ambiguous rename to {}: chose {} over {}",
                        amb.to,
                        amb.chosen,
                        amb.other_candidates.join(", ")
                    );
                }
                if o.soft_failures > 0 {
                    let _ = writeln!(out, "{} files were unavailable for reading.", o.soft_failures);
                }
            }
        }
        if self.test_mode && verbosity > 0 {
            out.push_str("warning: database file not updated on disk (test mode).\n");
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn list_paths<I>(out: &mut String, label: &str, lines: I)
where
    I: ExactSizeIterator<Item = String>,
{
    if lines.len() == 0 {
        return;
    }
    let _ = writeln!(out, "{} entries {label}:", lines.len());
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
}
