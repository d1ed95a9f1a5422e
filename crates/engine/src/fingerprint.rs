//! Content fingerprinting.
//!
//! MD5 over the full byte content, streamed in fixed-size chunks,
//! hex-encoded lowercase. The fingerprint is the dedup key: identical
//! bytes collapse to the same value regardless of file name or path.

use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

const CHUNK_SIZE: usize = 8192;

/// Computes the fingerprint of an in-memory buffer.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the fingerprint of an entire file by streaming fixed-size
/// chunks through the hash.
pub fn fingerprint_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
