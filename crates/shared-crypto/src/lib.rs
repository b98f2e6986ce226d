//! # Shared Crypto - Request Signing Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `canonical` | RFC 8785 JSON (JCS) | Deterministic bytes for signing and hashing |
//! | `hashing` | SHA-256 | Payload hashes, audit chain links |
//! | `signatures` | HMAC-SHA256 | `ActionRequest` authentication |
//! | `secure_key` | 256-bit secret | Zeroizing signing key |
//!
//! ## Security Properties
//!
//! - **Constant-time verification**: MAC comparison goes through `verify_slice`
//! - **No panics on hostile input**: malformed signatures verify as `false`
//! - **Key hygiene**: key bytes are wiped on drop and never printed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod errors;
pub mod hashing;
pub mod secure_key;
pub mod signatures;

// Re-exports
pub use canonical::{canonical_json, canonical_signing_input, to_canonical_string};
pub use errors::CryptoError;
pub use hashing::{chain_hash, sha256, sha256_hex, sha256_hex_json, GENESIS_CHAIN_HASH};
pub use secure_key::SigningKey;
pub use signatures::{sign, verify};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
