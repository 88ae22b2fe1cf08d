//! SQLite-backed fingerprint store: one row per tracked path.
//!
//! The store runs in rollback-journal mode so that every committed batch is
//! fully reflected in the main database file, which is what the integrity
//! sidecar fingerprints.

#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use sha2::{Digest, Sha512};
use tempfile::NamedTempFile;

use crate::core::errors::{Result, RotError};
use crate::hashing::digest::hex_encode;

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    /// Modification time in whole epoch seconds.
    pub mtime: i64,
    pub hash: String,
    /// When `hash` was last confirmed correct.
    pub timestamp: String,
}

/// Handle to the fingerprint database.
pub struct Store {
    conn: Connection,
    path: PathBuf,
    // Declared after `conn` so the connection closes before the copy is removed.
    scratch: Option<NamedTempFile>,
}

impl Store {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            scratch: None,
        })
    }

    /// Open a throwaway copy of the store at `path`.
    ///
    /// The copy is taken once and removed when the handle drops, so nothing
    /// done through it can reach the real store.
    pub fn open_copy(path: &Path) -> Result<Self> {
        let mut original = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(RotError::StoreMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => return Err(RotError::io(path, source)),
        };
        let mut scratch = tempfile::Builder::new()
            .prefix("rotwatch_")
            .suffix(".db")
            .tempfile()
            .map_err(|source| RotError::io(std::env::temp_dir(), source))?;
        io::copy(&mut original, scratch.as_file_mut())
            .map_err(|source| RotError::io(scratch.path(), source))?;
        scratch
            .as_file()
            .sync_all()
            .map_err(|source| RotError::io(scratch.path(), source))?;

        let copy_path = scratch.path().to_path_buf();
        tracing::debug!(
            target: "rotwatch::store",
            original = %path.display(),
            copy = %copy_path.display(),
            "opened throwaway store copy"
        );
        let mut store = Self::open(&copy_path)?;
        store.scratch = Some(scratch);
        Ok(store)
    }

    /// Open an existing store without write access.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RotError::StoreMissing {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            scratch: None,
        })
    }

    /// Path of the database file this handle writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle works on a throwaway copy.
    pub fn is_copy(&self) -> bool {
        self.scratch.is_some()
    }

    // ──────────────────── reads ────────────────────

    pub fn all_paths(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT path FROM bitrot")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(rows)
    }

    /// Every `(hash, path)` pair, for building the rename index.
    pub fn hash_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare_cached("SELECT hash, path FROM bitrot")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, path: &str) -> Result<Option<FileRecord>> {
        let record = self
            .conn
            .prepare_cached("SELECT path, mtime, hash, timestamp FROM bitrot WHERE path = ?1")?
            .query_row(params![path], |row| {
                Ok(FileRecord {
                    path: row.get(0)?,
                    mtime: row.get(1)?,
                    hash: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(path) FROM bitrot", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// SHA-512 over every stored hash ordered by path; timestamps and mtimes
    /// are ignored so two trees with identical content compare equal.
    pub fn stable_sum(&self) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT hash FROM bitrot ORDER BY path")?;
        let mut rows = stmt.query([])?;
        let mut hasher = Sha512::new();
        while let Some(row) = rows.next()? {
            let hash: String = row.get(0)?;
            hasher.update(hash.as_bytes());
        }
        Ok(hex_encode(&hasher.finalize()))
    }

    // ──────────────────── writes ────────────────────

    pub fn insert(&self, record: &FileRecord) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO bitrot (path, mtime, hash, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                record.path,
                record.mtime,
                record.hash,
                record.timestamp
            ])?;
        Ok(())
    }

    /// Overwrite content fields after a legitimate edit.
    pub fn update_content(&self, path: &str, mtime: i64, hash: &str, timestamp: &str) -> Result<bool> {
        let changed = self
            .conn
            .prepare_cached("UPDATE bitrot SET mtime = ?1, hash = ?2, timestamp = ?3 WHERE path = ?4")?
            .execute(params![mtime, hash, timestamp, path])?;
        Ok(changed > 0)
    }

    /// Move a record to a new path, keeping its hash.
    pub fn rename(&self, from: &str, to: &str, mtime: i64, timestamp: &str) -> Result<bool> {
        let changed = self
            .conn
            .prepare_cached("UPDATE bitrot SET path = ?1, mtime = ?2, timestamp = ?3 WHERE path = ?4")?
            .execute(params![to, mtime, timestamp, from])?;
        Ok(changed > 0)
    }

    pub fn delete(&self, path: &str) -> Result<bool> {
        let changed = self
            .conn
            .prepare_cached("DELETE FROM bitrot WHERE path = ?1")?
            .execute(params![path])?;
        Ok(changed > 0)
    }

    // ──────────────────── transactions ────────────────────

    pub fn begin(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Commit the open batch, if any.
    pub fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Discard the open batch, if any.
    pub fn rollback(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Compact the database file. Must run outside a transaction.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

/// Stable cross-tree digest of the store at `db_path`.
///
/// Opens the store read-only; a missing store is reported as
/// [`RotError::StoreMissing`].
pub fn stable_sum(db_path: &Path) -> Result<String> {
    Store::open_read_only(db_path)?.stable_sum()
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("delete") {
        tracing::warn!(target: "rotwatch::store", mode, "requested rollback journal but got another mode");
    }
    conn.execute_batch("PRAGMA synchronous = FULL;")?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bitrot (
            path TEXT PRIMARY KEY,
            mtime INTEGER,
            hash TEXT,
            timestamp TEXT
        );
        CREATE INDEX IF NOT EXISTS bitrot_hash_idx ON bitrot (hash);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join(".bitrot.db")).unwrap();
        (dir, store)
    }

    fn record(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            mtime: 1_700_000_000,
            hash: hash.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn schema_created_with_rollback_journal() {
        let (_dir, store) = temp_store();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "delete");
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.is_copy());
    }

    #[test]
    fn insert_get_and_duplicate_path_rejected() {
        let (_dir, store) = temp_store();
        store.insert(&record("a.txt", "h1")).unwrap();
        assert_eq!(store.get("a.txt").unwrap(), Some(record("a.txt", "h1")));
        assert!(store.get("b.txt").unwrap().is_none());
        assert!(store.insert(&record("a.txt", "h2")).is_err());
    }

    #[test]
    fn update_rename_delete() {
        let (_dir, store) = temp_store();
        store.insert(&record("a.txt", "h1")).unwrap();

        assert!(store.update_content("a.txt", 5, "h2", "later").unwrap());
        let row = store.get("a.txt").unwrap().unwrap();
        assert_eq!((row.mtime, row.hash.as_str(), row.timestamp.as_str()), (5, "h2", "later"));

        assert!(store.rename("a.txt", "b.txt", 6, "latest").unwrap());
        assert!(store.get("a.txt").unwrap().is_none());
        let moved = store.get("b.txt").unwrap().unwrap();
        assert_eq!(moved.hash, "h2");
        assert_eq!(moved.mtime, 6);

        assert!(!store.rename("a.txt", "c.txt", 7, "x").unwrap());
        assert!(store.delete("b.txt").unwrap());
        assert!(!store.delete("b.txt").unwrap());
    }

    #[test]
    fn paths_and_hash_pairs() {
        let (_dir, store) = temp_store();
        store.insert(&record("a", "h1")).unwrap();
        store.insert(&record("b", "h1")).unwrap();
        store.insert(&record("c", "h2")).unwrap();
        let paths: Vec<String> = store.all_paths().unwrap().into_iter().collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        let mut pairs = store.hash_pairs().unwrap();
        pairs.sort();
        assert_eq!(pairs[0], ("h1".to_string(), "a".to_string()));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn rollback_discards_open_batch() {
        let (_dir, store) = temp_store();
        store.begin().unwrap();
        store.insert(&record("kept", "h")).unwrap();
        store.commit().unwrap();
        store.begin().unwrap();
        store.insert(&record("dropped", "h")).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.count().unwrap(), 1);
        store.vacuum().unwrap();
    }

    #[test]
    fn copy_never_touches_original() {
        let (dir, store) = temp_store();
        store.insert(&record("a", "h1")).unwrap();
        drop(store);
        let original = dir.path().join(".bitrot.db");

        let copy = Store::open_copy(&original).unwrap();
        assert!(copy.is_copy());
        assert_ne!(copy.path(), original.as_path());
        copy.insert(&record("b", "h2")).unwrap();
        let copy_path = copy.path().to_path_buf();
        drop(copy);
        assert!(!copy_path.exists());

        let reopened = Store::open(&original).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn copy_of_missing_store_is_store_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = Store::open_copy(&dir.path().join(".bitrot.db"));
        assert!(matches!(result, Err(RotError::StoreMissing { .. })));
    }

    #[test]
    fn stable_sum_ignores_timestamps_and_tracks_hashes() {
        let (dir_a, store_a) = temp_store();
        let (dir_b, store_b) = temp_store();
        store_a.insert(&record("x", "h1")).unwrap();
        store_a.insert(&record("y", "h2")).unwrap();
        let mut other = record("y", "h2");
        other.timestamp = "2030-06-06T06:06:06Z".to_string();
        other.mtime = 1;
        store_b.insert(&other).unwrap();
        store_b.insert(&record("x", "h1")).unwrap();
        drop((store_a, store_b));

        let sum_a = stable_sum(&dir_a.path().join(".bitrot.db")).unwrap();
        let sum_b = stable_sum(&dir_b.path().join(".bitrot.db")).unwrap();
        assert_eq!(sum_a, sum_b);
        assert_eq!(sum_a.len(), 128);

        let store_b = Store::open(&dir_b.path().join(".bitrot.db")).unwrap();
        store_b.update_content("y", 1, "h3", "t").unwrap();
        assert_ne!(store_b.stable_sum().unwrap(), sum_a);
    }

    #[test]
    fn stable_sum_of_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            stable_sum(&dir.path().join("none.db")),
            Err(RotError::StoreMissing { .. })
        ));
    }
}
