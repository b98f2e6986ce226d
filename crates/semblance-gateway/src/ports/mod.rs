//! Hexagonal ports.
//!
//! - `inbound`: what transports call into (`RequestHandler`)
//! - `outbound`: what the Gateway needs from its host (store, clock,
//!   service handlers, anomaly sink)

pub mod inbound;
pub mod outbound;
