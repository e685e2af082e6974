//! Request keys and payload fingerprints.

use sha2::{Digest, Sha256};

/// Compute the row key identifying a request within a store.
///
/// Identity is method plus URL; callers pass the URL already stripped of
/// its fragment.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fast, non-cryptographic fingerprint of a text payload.
///
/// Runs `h = h * 31 + unit` over the UTF-16 code units of `payload`,
/// wrapping in 32-bit two's complement. The empty string hashes to 0.
pub fn content_hash(payload: &str) -> i32 {
    payload
        .encode_utf16()
        .fold(0i32, |h, unit| (h << 5).wrapping_sub(h).wrapping_add(i32::from(unit)))
}
