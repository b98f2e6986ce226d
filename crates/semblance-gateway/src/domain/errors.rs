//! # Domain Errors
//!
//! `GatewayError` is the pipeline's rejection type. Every variant maps to
//! exactly one wire `ErrorCode`. Component errors (`StoreError`,
//! `AllowlistError`, ...) stay inside the Gateway and surface to callers as
//! `INTERNAL_ERROR` at most.

use shared_crypto::CryptoError;
use shared_types::{ActionType, ErrorCode, SchemaError};
use thiserror::Error;

// =============================================================================
// PIPELINE REJECTIONS
// =============================================================================

/// Which rate window refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Global,
    Action(ActionType),
}

impl std::fmt::Display for RateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateScope::Global => f.write_str("global"),
            RateScope::Action(action) => write!(f, "{action}"),
        }
    }
}

/// A request refused by the validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("signature does not match request")]
    SignatureInvalid,

    #[error("timestamp {timestamp} is outside the freshness window")]
    TimestampStale { timestamp: String },

    #[error("request id {id} was already used")]
    RequestReplayed { id: String },

    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    #[error("payload rejected: {0}")]
    SchemaInvalid(#[from] SchemaError),

    #[error("destination {domain} is not on the allow-list")]
    DomainNotAllowed { domain: String, port: Option<u16> },

    #[error("rate limit exceeded ({scope})")]
    RateLimited { scope: RateScope, retry_after_secs: u64 },

    /// Details are logged, never returned.
    #[error("internal gateway error")]
    Internal,
}

impl GatewayError {
    /// Wire code for this rejection.
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::SignatureInvalid => ErrorCode::SignatureInvalid,
            GatewayError::TimestampStale { .. } => ErrorCode::TimestampStale,
            GatewayError::RequestReplayed { .. } => ErrorCode::RequestReplayed,
            GatewayError::UnknownAction { .. } => ErrorCode::UnknownAction,
            GatewayError::SchemaInvalid(_) => ErrorCode::SchemaInvalid,
            GatewayError::DomainNotAllowed { .. } => ErrorCode::DomainNotAllowed,
            GatewayError::RateLimited { .. } => ErrorCode::RateLimited,
            GatewayError::Internal => ErrorCode::InternalError,
        }
    }
}

// =============================================================================
// COMPONENT ERRORS
// =============================================================================

/// Key-value store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store I/O error: {message}")]
    Io { message: String },

    #[error("store corruption: {message}")]
    Corruption { message: String },

    #[error("data directory already in use ({path})")]
    Locked { path: String },
}

impl StoreError {
    pub(crate) fn io(err: impl std::fmt::Display) -> Self {
        StoreError::Io {
            message: err.to_string(),
        }
    }

    pub(crate) fn corruption(err: impl std::fmt::Display) -> Self {
        StoreError::Corruption {
            message: err.to_string(),
        }
    }
}

/// Allow-list management failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllowlistError {
    #[error("wildcard domains are not allowed: {0}")]
    WildcardDomain(String),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("no allow-list entry with id {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Certificate pin registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("invalid sha256 fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("no pin registered for {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Audit trail failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit row could not be encoded: {0}")]
    Encoding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signing key lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("stored signing key is unusable: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while assembling a `Gateway` from its store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("allow-list could not be loaded: {0}")]
    Allowlist(#[from] AllowlistError),

    #[error("certificate pins could not be loaded: {0}")]
    Pins(#[from] PinError),

    #[error("audit trail could not be opened: {0}")]
    Audit(#[from] AuditError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::SchemaViolation;

    #[test]
    fn test_every_rejection_has_a_distinct_code() {
        let errors = [
            GatewayError::SignatureInvalid,
            GatewayError::TimestampStale {
                timestamp: "t".into(),
            },
            GatewayError::RequestReplayed { id: "r".into() },
            GatewayError::UnknownAction { action: "x".into() },
            GatewayError::SchemaInvalid(SchemaError::Invalid {
                action: "web.fetch",
                violation: SchemaViolation::Constraint,
                field: None,
                reason: "r".into(),
            }),
            GatewayError::DomainNotAllowed {
                domain: "d".into(),
                port: None,
            },
            GatewayError::RateLimited {
                scope: RateScope::Global,
                retry_after_secs: 1,
            },
            GatewayError::Internal,
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code().as_str()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_internal_message_is_generic() {
        assert_eq!(GatewayError::Internal.to_string(), "internal gateway error");
    }
}
