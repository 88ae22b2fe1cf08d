//! Streaming content digests.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};

/// Hex length of a file content digest (SHA-256).
pub const CONTENT_DIGEST_HEX_LEN: usize = 64;

/// Hex length of the store sidecar and cross-tree digests (SHA-512).
pub const STORE_DIGEST_HEX_LEN: usize = 128;

/// SHA-256 of everything `reader` yields, read `chunk_size` bytes at a time.
pub fn digest_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

/// SHA-256 of the file at `path`, streamed in `chunk_size` chunks.
pub fn digest_file(path: &Path, chunk_size: usize) -> io::Result<String> {
    let file = File::open(path)?;
    digest_reader(file, chunk_size)
}

/// SHA-512 of the file at `path`. Used for the store sidecar.
pub fn sha512_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha512::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

/// Lowercase hex encoding.
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}
