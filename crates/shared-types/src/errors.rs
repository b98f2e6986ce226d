//! # Error Codes
//!
//! Codes surfaced to callers in `ActionResponse.error.code`.
//!
//! Handler-specific codes (e.g. `IMAP_ERROR`) are plain strings passed through
//! unmodified; the codes below are the ones the Gateway itself produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes produced by the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Signature missing, malformed, or not matching the request fields.
    SignatureInvalid,
    /// Timestamp unparseable or outside the freshness window (either direction).
    TimestampStale,
    /// Request id already seen inside the retention window.
    RequestReplayed,
    /// Payload does not match the action's strict schema.
    SchemaInvalid,
    /// Target destination is not on the allow-list.
    DomainNotAllowed,
    /// Per-action or global rate limit exceeded.
    RateLimited,
    /// Action name is not part of the closed action catalog.
    UnknownAction,
    /// Gateway-side failure (storage, key material). Details stay in the log.
    InternalError,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::SignatureInvalid,
        ErrorCode::TimestampStale,
        ErrorCode::RequestReplayed,
        ErrorCode::SchemaInvalid,
        ErrorCode::DomainNotAllowed,
        ErrorCode::RateLimited,
        ErrorCode::UnknownAction,
        ErrorCode::InternalError,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SignatureInvalid => "SIGNATURE_INVALID",
            ErrorCode::TimestampStale => "TIMESTAMP_STALE",
            ErrorCode::RequestReplayed => "REQUEST_REPLAYED",
            ErrorCode::SchemaInvalid => "SCHEMA_INVALID",
            ErrorCode::DomainNotAllowed => "DOMAIN_NOT_ALLOWED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::UnknownAction => "UNKNOWN_ACTION",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may resend the same logical request later.
    ///
    /// Only rate limiting is transient. Freshness and replay failures need a
    /// new id and timestamp, which makes them new requests, not retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::RateLimited)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code attached to audit records left `pending` by a crash.
pub const GATEWAY_INTERRUPTED: &str = "GATEWAY_INTERRUPTED";

/// Code returned when a handler's response is too large for one IPC frame.
/// The action did run; `auditRef` points at its record.
pub const RESPONSE_TOO_LARGE: &str = "RESPONSE_TOO_LARGE";

/// Code returned when no handler is registered for a known action.
pub const HANDLER_NOT_CONFIGURED: &str = "HANDLER_NOT_CONFIGURED_ERROR";
