//! Domain layer: the individual checks of the validation pipeline.
//!
//! Each component owns its state behind its own lock and is constructed by
//! the `Gateway`, so two gateways in one process never share counters,
//! replay sets, or chain tails.

pub mod allowlist;
pub mod anomaly;
pub mod audit_trail;
pub mod cert_pins;
pub mod config;
pub mod errors;
pub mod key_manager;
pub mod rate_limiter;
pub mod replay_guard;

/// RFC 3339 UTC with millisecond precision, the format of every timestamp
/// the Gateway writes.
pub(crate) fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
