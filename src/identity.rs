//! Stable, content-addressed chunk identity.
//!
//! Re-ingesting an unchanged document must upsert the exact same rows, so a
//! chunk id is a pure function of `(file, content_hash, position)`: SHA-256
//! over the joined triple, URL-safe base64 without padding. The id is safe
//! to use directly as a storage key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Derive the deterministic id for one chunk.
///
/// Identical inputs always produce identical output; changing the file
/// identity, the chunk text (via its hash), or the position produces a
/// different id.
pub fn chunk_id(file: &str, content_hash: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file.as_bytes());
    hasher.update([0]);
    hasher.update(content_hash.as_bytes());
    hasher.update([0]);
    hasher.update(position.to_le_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// SHA-256 of chunk text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
