//! # Request / Response Envelope
//!
//! The only two message shapes that cross the Core ↔ Gateway boundary.
//!
//! ## Security Properties
//!
//! - **Signed Fields**: `signature` is an HMAC over `(id, timestamp, action,
//!   payload)`. `source` is not signed; it is checked structurally.
//! - **Exact Bytes**: `timestamp` and `action` stay strings on the wire so the
//!   Gateway verifies exactly what Core signed, before interpreting either.
//! - **Correlation**: `ActionResponse.request_id` always equals the
//!   originating `ActionRequest.id`.

use crate::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured-but-opaque payload map.
pub type Payload = serde_json::Map<String, Value>;

/// The originator of a request. Only Core may originate requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    /// The network-isolated business-logic process.
    Core,
}

/// A signed request from Core asking the Gateway to perform one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionRequest {
    // =========================================================================
    // SIGNED SECTION
    // =========================================================================
    /// Client-generated unique identifier (UUIDv4 in practice).
    pub id: String,

    /// ISO-8601 / RFC 3339 creation time.
    /// Valid window: `|now - timestamp| <= 30s`.
    pub timestamp: String,

    /// Dotted action name, e.g. `web.fetch`.
    pub action: String,

    /// Action arguments. Validated against the action's strict schema.
    pub payload: Payload,

    // =========================================================================
    // UNSIGNED SECTION
    // =========================================================================
    /// Always `core`.
    pub source: RequestSource,

    /// Lowercase hex HMAC-SHA256 over the signed section.
    pub signature: String,
}

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Error body carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    /// Either an `ErrorCode` wire string or a handler-specific code.
    pub code: String,
    /// Human-readable message. Never contains key material or other tenants' data.
    pub message: String,
}

impl ActionError {
    /// Error with an arbitrary (handler-supplied) code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error with a Gateway-produced code.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code.as_str(), message)
    }

    /// Whether `code` is the given Gateway code.
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code.as_str()
    }
}

/// The Gateway's answer to an `ActionRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    /// Equals the originating request's `id`.
    pub request_id: String,
    /// ISO-8601 time the response was produced.
    pub timestamp: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
    /// Audit record id, or `null` when the request was rejected before it
    /// was authenticated and de-duplicated.
    pub audit_ref: Option<String>,
}

impl ActionResponse {
    /// Successful response.
    pub fn success(
        request_id: impl Into<String>,
        timestamp: impl Into<String>,
        data: Value,
        audit_ref: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: timestamp.into(),
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            audit_ref,
        }
    }

    /// Failed response.
    pub fn failure(
        request_id: impl Into<String>,
        timestamp: impl Into<String>,
        error: ActionError,
        audit_ref: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: timestamp.into(),
            status: ResponseStatus::Error,
            data: None,
            error: Some(error),
            audit_ref,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// The error code, if this is a failed response.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
