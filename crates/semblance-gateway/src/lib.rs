//! # Semblance Gateway - Validation Kernel
//!
//! The only process allowed to reach the network on behalf of Core. Every
//! call from Core arrives as a signed `ActionRequest` and passes the same
//! pipeline, whichever transport carried it.
//!
//! ## Architecture
//!
//! ```text
//! Core ──► IpcTransport.send(ActionRequest)
//!               │
//!               ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Gateway::validate_and_execute              │
//! │                                                               │
//! │  signature ─► freshness ─► replay ─► schema ─► allow-list     │
//! │       ─► rate limit ─► anomaly (advisory) ─► audit(pending)   │
//! │                                                               │
//! │  ServiceRegistry.dispatch(action, payload)                    │
//! │                                                               │
//! │  audit(success | error) ─► ActionResponse                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Layout
//!
//! - `domain/` - the checks themselves, each owning its own state
//! - `ports/` - `RequestHandler` (inbound), store/clock/registry/sink (outbound)
//! - `adapters/` - storage backends, clocks, the handler registry
//! - `ipc/` - in-process and Unix-socket transports, the Core-side client
//! - `service.rs` - the `Gateway` orchestrator
//!
//! ## Security
//!
//! - Authentication, freshness and replay checks run before anything touches
//!   the audit trail, so forged or replayed traffic cannot pollute it.
//! - Default deny: a destination is reachable only after explicit allow-listing.
//! - The audit trail is append-only and hash-chained; `verify_chain` detects
//!   any edit to a historical row.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod service;

pub use domain::config::{AnomalyConfig, GatewayConfig, RateLimitConfig};
pub use domain::errors::{
    AllowlistError, AuditError, GatewayError, KeyError, PinError, StartupError, StoreError,
};
pub use ports::inbound::RequestHandler;
pub use ports::outbound::{
    ActionHandler, AnomalySink, BatchOperation, Clock, HandlerError, KeyValueStore,
    ServiceRegistry,
};
pub use service::Gateway;
