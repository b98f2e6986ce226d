//! # IPC Transports
//!
//! How an `ActionRequest` gets from Core to the `Gateway` and back.
//!
//! | Transport | Use |
//! |-----------|-----|
//! | `InProcessTransport` | Embedding and tests: calls the handler directly |
//! | `UnixSocketTransport` / `UnixSocketServer` | Separate processes, newline-delimited JSON |
//!
//! Both end in the same `RequestHandler`, so a request is validated
//! identically whichever path it took.
//!
//! ## Contract
//!
//! - `send` before `start` fails with `TransportError::NotStarted`.
//! - A response whose `requestId` differs from the request's `id` is a
//!   protocol violation and is returned as an error, never as a response.

pub mod client;
pub mod in_process;
#[cfg(unix)]
pub mod unix_socket;

pub use client::CoreClient;
pub use in_process::InProcessTransport;
#[cfg(unix)]
pub use unix_socket::{UnixSocketServer, UnixSocketTransport};

use async_trait::async_trait;
use shared_types::{ActionRequest, ActionResponse};
use thiserror::Error;

/// Largest accepted frame, in bytes, excluding the trailing newline.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not started")]
    NotStarted,

    #[error("response for {actual} does not match request {expected}")]
    ProtocolViolation { expected: String, actual: String },

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame could not be decoded: {0}")]
    Codec(String),

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("connection closed by peer")]
    Closed,

    #[error("request could not be signed: {0}")]
    Signing(String),
}

/// A channel from Core to the Gateway.
#[async_trait]
pub trait IpcTransport: Send + Sync {
    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    fn is_ready(&self) -> bool;

    /// Deliver one request and wait for its response.
    async fn send(&self, request: ActionRequest) -> Result<ActionResponse, TransportError>;
}

/// Reject a response that answers a different request.
pub fn ensure_correlated(
    request_id: &str,
    response: ActionResponse,
) -> Result<ActionResponse, TransportError> {
    if response.request_id != request_id {
        return Err(TransportError::ProtocolViolation {
            expected: request_id.to_string(),
            actual: response.request_id,
        });
    }
    Ok(response)
}
