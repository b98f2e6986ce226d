//! # Inbound Ports (Driving Ports)
//!
//! The API transports drive. The `Gateway` implements `RequestHandler`; the
//! in-process transport and the Unix-socket server both hold it as
//! `Arc<dyn RequestHandler>`, which is what makes the two paths identical.

use async_trait::async_trait;
use shared_types::{ActionRequest, ActionResponse};

/// Validates and executes one request. Never fails: every outcome,
/// including internal errors, is expressed as an `ActionResponse`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: ActionRequest) -> ActionResponse;
}
