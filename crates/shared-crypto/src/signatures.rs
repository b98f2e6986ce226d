//! # HMAC-SHA256 Request Signatures
//!
//! Authenticates `ActionRequest`s crossing the Core ↔ Gateway boundary.
//!
//! ## Security Properties
//!
//! - The MAC covers `canonical_signing_input(id, timestamp, action, payload)`,
//!   so payload key order on the wire does not matter but every value does.
//! - `verify` compares in constant time via `Mac::verify_slice`.
//! - A signature that is not valid hex, or has the wrong length, verifies as
//!   `false`. Nothing past this boundary sees a decode error.

use crate::canonical::canonical_signing_input;
use crate::CryptoError;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 output length in bytes.
pub const SIGNATURE_LEN: usize = 32;

fn mac_for(
    key: &[u8],
    id: &str,
    timestamp: &str,
    action: &str,
    payload: &Map<String, Value>,
) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::MacInit)?;
    mac.update(canonical_signing_input(id, timestamp, action, payload)?.as_bytes());
    Ok(mac)
}

/// Sign the request tuple. Returns lowercase hex.
pub fn sign(
    key: &[u8],
    id: &str,
    timestamp: &str,
    action: &str,
    payload: &Map<String, Value>,
) -> Result<String, CryptoError> {
    let mac = mac_for(key, id, timestamp, action, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify `signature` over the request tuple.
pub fn verify(
    key: &[u8],
    signature: &str,
    id: &str,
    timestamp: &str,
    action: &str,
    payload: &Map<String, Value>,
) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    if expected.len() != SIGNATURE_LEN {
        return false;
    }
    match mac_for(key, id, timestamp, action, payload) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}
