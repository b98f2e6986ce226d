//! # Signing Key Type
//!
//! The 256-bit HMAC secret shared by Core and the Gateway.
//!
//! ## Security
//!
//! The bytes are zeroed on drop and never appear in `Debug` output.
//! Equality is constant-time.

use crate::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes.
pub const SIGNING_KEY_LEN: usize = 32;

/// A secret HMAC key that zeroizes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    inner: [u8; SIGNING_KEY_LEN],
}

impl SigningKey {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; SIGNING_KEY_LEN]) -> Self {
        Self { inner: bytes }
    }

    /// Fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut inner = [0u8; SIGNING_KEY_LEN];
        OsRng.fill_bytes(&mut inner);
        Self { inner }
    }

    /// Create from a slice (copies into fixed array).
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SIGNING_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SIGNING_KEY_LEN,
                actual: slice.len(),
            });
        }
        let mut inner = [0u8; SIGNING_KEY_LEN];
        inner.copy_from_slice(slice);
        Ok(Self { inner })
    }

    /// Decode from the hex form used at rest.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// Hex form for persistence. The caller owns wiping the returned string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner)
    }

    /// Get the key bytes.
    ///
    /// # Security
    ///
    /// Avoid keeping references to the returned slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl PartialEq for SigningKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.ct_eq(&other.inner).into()
    }
}

impl Eq for SigningKey {}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(***)")
    }
}
