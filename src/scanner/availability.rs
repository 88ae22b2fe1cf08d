//! Content-availability probe for cloud placeholder files.
//!
//! Sync clients (OneDrive and friends) leave stub files on disk whose bytes
//! are only fetched on first read. Hashing them would trigger a download of
//! the whole tree, so the scanner asks a probe first.

use std::fs::Metadata;
use std::path::Path;

/// `FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS` from the Win32 file attribute set.
pub const FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS: u32 = 0x0040_0000;

/// Answers "can this file's content be read without a network fetch?".
pub trait AvailabilityProbe: Send + Sync {
    fn is_content_local(&self, path: &Path, metadata: &Metadata) -> bool;
}

/// Probe backed by the host platform's file attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformProbe;

impl AvailabilityProbe for PlatformProbe {
    fn is_content_local(&self, _path: &Path, metadata: &Metadata) -> bool {
        #[cfg(windows)]
        {
            use std::os::windows::fs::MetadataExt;
            metadata.file_attributes() & FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS == 0
        }
        #[cfg(not(windows))]
        {
            let _ = metadata;
            true
        }
    }
}

/// Probe that treats every file as local.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLocal;

impl AvailabilityProbe for AlwaysLocal {
    fn is_content_local(&self, _path: &Path, _metadata: &Metadata) -> bool {
        true
    }
}
