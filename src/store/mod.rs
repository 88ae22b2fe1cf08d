//! Fingerprint store (SQLite) and its integrity sidecar.

pub mod database;
pub mod integrity;

pub use database::{FileRecord, Store, stable_sum};
pub use integrity::{IntegrityGuard, IntegrityStatus};
