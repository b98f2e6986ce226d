//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Stored key material could not be decoded
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    /// The MAC could not be initialised with the given key
    #[error("MAC initialisation failed")]
    MacInit,

    /// A value could not be rendered as canonical JSON
    #[error("Canonical JSON encoding failed: {0}")]
    Canonicalization(String),
}
