//! Content hashing for compiled logic
//!
//! Fingerprints let the impact gateway recognise that a new request carries
//! the same logic as the last one it estimated.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute 16-character hex hash of content (first 64 bits of SHA-256).
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Fingerprint of a logic object together with its scope.
///
/// Object keys serialize in sorted order, so equal logic always hashes equal.
pub fn logic_fingerprint(logic: &Value, scope_id: &str) -> String {
    let mut content = logic.to_string().into_bytes();
    content.push(0);
    content.extend_from_slice(scope_id.as_bytes());
    content_hash(&content)
}
