//! # Shared Types Crate
//!
//! All types that cross the Core ↔ Gateway boundary, plus the records the
//! Gateway persists.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Core and the Gateway serialize the exact same
//!   structs, so the wire shape cannot drift between the two processes.
//! - **Closed Action Set**: `ActionType` enumerates every action the Gateway
//!   will ever dispatch. Each one owns a strict payload schema that rejects
//!   unknown fields.
//! - **Envelope Authority**: `ActionRequest.signature` covers
//!   `(id, timestamp, action, payload)` exactly as sent.

pub mod actions;
pub mod entities;
pub mod envelope;
pub mod errors;

pub use actions::{
    ActionPayload, ActionType, HttpMethod, NetworkTarget, SchemaError, SchemaViolation,
    UnknownAction,
};
pub use entities::*;
pub use envelope::{
    ActionError, ActionRequest, ActionResponse, Payload, RequestSource, ResponseStatus,
};
pub use errors::ErrorCode;
