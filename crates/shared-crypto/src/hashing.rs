//! # SHA-256 Hashing
//!
//! Digests used for audit payload hashes and chain links.

use crate::canonical::canonical_json;
use crate::CryptoError;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 output (256-bit).
pub type Hash = [u8; 32];

/// Chain value the first audit row links from.
pub const GENESIS_CHAIN_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Lowercase hex SHA-256 of the canonical rendering of `value`.
pub fn sha256_hex_json(value: &Value) -> Result<String, CryptoError> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// `sha256hex(previous ‖ canonical_entry)`.
pub fn chain_hash(previous: &str, canonical_entry: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(canonical_entry.as_bytes());
    hex::encode(hasher.finalize())
}
