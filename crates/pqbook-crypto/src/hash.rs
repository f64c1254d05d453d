//! SHA-256 hashing and short public-key fingerprints.
//!
//! Public keys are several kilobytes long, so logs refer to a sender
//! by a fingerprint instead of the raw key.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_LEN: usize = 8;

/// Computes the SHA-256 hash of arbitrary data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Returns a 16-character hex fingerprint of a public key.
///
/// Only meant for log correlation; identity comparisons always use
/// the full key bytes.
pub fn key_fingerprint(public_key: &[u8]) -> String {
    hex::encode(&sha256(public_key)[..FINGERPRINT_LEN])
}
