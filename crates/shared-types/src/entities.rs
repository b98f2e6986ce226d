//! # Persisted Entities
//!
//! Records the Gateway keeps across restarts: audit rows, allow-list entries,
//! and certificate pins.
//!
//! ## Clusters
//!
//! - **Audit**: `AuditEntry`, `AuditStatus`, `AutonomyTier`
//! - **Allow-list**: `AllowedService`, `Protocol`
//! - **Transport Trust**: `CertificatePin`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLUSTER A: AUDIT
// =============================================================================

/// Lifecycle state of one audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Written before dispatch.
    Pending,
    /// Handler returned data.
    Success,
    /// Handler failed, or the Gateway died mid-dispatch.
    Error,
    /// Refused by schema, allow-list, or rate-limit checks; never dispatched.
    Rejected,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Success => "success",
            AuditStatus::Error => "error",
            AuditStatus::Rejected => "rejected",
        }
    }

    /// Whether no further row will follow this one for the same record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AuditStatus::Pending)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much latitude the user granted the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyTier {
    /// Every action needs explicit approval.
    Guardian,
    /// Reads run freely, writes need approval.
    #[default]
    Partner,
    /// Acts on the user's behalf without prompting.
    AlterEgo,
}

impl AutonomyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyTier::Guardian => "guardian",
            AutonomyTier::Partner => "partner",
            AutonomyTier::AlterEgo => "alter_ego",
        }
    }

    /// Whether an action of this kind would need the user's sign-off.
    pub fn approval_required(&self, is_write: bool) -> bool {
        match self {
            AutonomyTier::Guardian => true,
            AutonomyTier::Partner => is_write,
            AutonomyTier::AlterEgo => false,
        }
    }
}

impl std::str::FromStr for AutonomyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guardian" => Ok(AutonomyTier::Guardian),
            "partner" => Ok(AutonomyTier::Partner),
            "alter_ego" | "alter-ego" => Ok(AutonomyTier::AlterEgo),
            other => Err(format!("unknown autonomy tier: {other}")),
        }
    }
}

/// One append-only row of the audit trail.
///
/// Rows belonging to the same request share `id` (the `auditRef` handed back
/// to Core). `sequence` is unique and strictly increasing across the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub sequence: u64,
    pub request_id: String,
    /// RFC 3339 time the row was written.
    pub timestamp: String,
    pub action: String,
    /// sha256 hex of the canonical request payload.
    pub payload_hash: String,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub autonomy_tier: AutonomyTier,
    pub approval_required: bool,
    pub approval_given: bool,
    pub estimated_time_saved_seconds: u32,
    /// sha256 hex of the canonical response data, on success rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_hash: Option<String>,
    /// sha256 hex linking this row to the previous one.
    pub chain_hash: String,
}

// =============================================================================
// CLUSTER B: ALLOW-LIST
// =============================================================================

/// Protocol an allow-listed service is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Https,
    Http,
    Imap,
    Imaps,
    Smtp,
    Smtps,
    Wss,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Https => "https",
            Protocol::Http => "http",
            Protocol::Imap => "imap",
            Protocol::Imaps => "imaps",
            Protocol::Smtp => "smtp",
            Protocol::Smtps => "smtps",
            Protocol::Wss => "wss",
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "https" => Ok(Protocol::Https),
            "http" => Ok(Protocol::Http),
            "imap" => Ok(Protocol::Imap),
            "imaps" => Ok(Protocol::Imaps),
            "smtp" => Ok(Protocol::Smtp),
            "smtps" => Ok(Protocol::Smtps),
            "wss" => Ok(Protocol::Wss),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// A destination the user explicitly authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedService {
    pub id: String,
    pub service_name: String,
    /// Lower-cased, no trailing dot.
    pub domain: String,
    /// `None` matches any port.
    #[serde(default)]
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub added_at: String,
    pub added_by: String,
    pub is_active: bool,
}

// =============================================================================
// CLUSTER C: TRANSPORT TRUST
// =============================================================================

/// Expected certificate fingerprints for one domain.
///
/// An empty `fingerprints` list means the pin has not been observed yet and
/// the first connection will record it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePin {
    pub domain: String,
    /// Lowercase hex SHA-256 fingerprints.
    pub fingerprints: Vec<String>,
    pub enforced: bool,
    #[serde(default)]
    pub description: String,
}
