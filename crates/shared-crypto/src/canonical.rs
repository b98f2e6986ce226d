//! # Canonical JSON
//!
//! RFC 8785 (JCS) rendering via `serde_jcs`: object keys sorted by UTF-16
//! code unit, no insignificant whitespace, ECMAScript number formatting.
//! Two structurally equal values always produce the same bytes regardless of
//! insertion order, so the output is safe to sign and hash.

use crate::CryptoError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize any value as JCS.
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> Result<String, CryptoError> {
    serde_jcs::to_string(value).map_err(|err| CryptoError::Canonicalization(err.to_string()))
}

/// Render `value` canonically.
pub fn canonical_json(value: &Value) -> Result<String, CryptoError> {
    to_canonical_string(value)
}

/// The exact string `sign` and `verify` MAC over: the canonical JSON array
/// `[id, timestamp, action, payload]`.
///
/// Encoding the tuple as an array keeps field boundaries unambiguous, so
/// moving a character from `id` into `timestamp` changes the input.
pub fn canonical_signing_input(
    id: &str,
    timestamp: &str,
    action: &str,
    payload: &Map<String, Value>,
) -> Result<String, CryptoError> {
    to_canonical_string(&(id, timestamp, action, payload))
}
