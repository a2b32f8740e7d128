//! Cache key derivation.

use sha2::{Digest, Sha256};

/// SHA-256 over the concatenation of `parts`, hex encoded.
///
/// Callers feed deterministic serializations (JSON of messages and settings),
/// so identical inputs always land on the same key.
pub fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
