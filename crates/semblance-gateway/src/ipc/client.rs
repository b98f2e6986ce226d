//! Core-side request builder.
//!
//! `CoreClient` is what the untrusted process uses to produce well-formed,
//! signed requests. It holds the shared key, so it must only ever run inside
//! Core.

use super::{IpcTransport, TransportError};
use crate::adapters::clock::SystemClock;
use crate::domain::format_timestamp;
use crate::ports::outbound::Clock;
use shared_crypto::SigningKey;
use shared_types::{ActionRequest, ActionResponse, ActionType, Payload, RequestSource};
use std::sync::Arc;
use uuid::Uuid;

pub struct CoreClient {
    transport: Arc<dyn IpcTransport>,
    key: SigningKey,
    clock: Arc<dyn Clock>,
}

impl CoreClient {
    pub fn new(transport: Arc<dyn IpcTransport>, key: SigningKey) -> Self {
        Self::with_clock(transport, key, Arc::new(SystemClock))
    }

    /// Stamp requests from `clock` instead of the wall clock.
    pub fn with_clock(
        transport: Arc<dyn IpcTransport>,
        key: SigningKey,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            key,
            clock,
        }
    }

    pub fn transport(&self) -> &Arc<dyn IpcTransport> {
        &self.transport
    }

    /// Build and sign a request with a fresh UUIDv4 id. `action` is taken
    /// as is, so unknown names can be produced too.
    pub fn build_request(
        &self,
        action: &str,
        payload: Payload,
    ) -> Result<ActionRequest, TransportError> {
        let id = Uuid::new_v4().to_string();
        let timestamp = format_timestamp(self.clock.now());
        let signature = shared_crypto::sign(self.key.as_bytes(), &id, &timestamp, action, &payload)
            .map_err(|e| TransportError::Signing(e.to_string()))?;

        Ok(ActionRequest {
            id,
            timestamp,
            action: action.to_string(),
            payload,
            source: RequestSource::Core,
            signature,
        })
    }

    /// Sign and send one action.
    pub async fn request(
        &self,
        action: ActionType,
        payload: Payload,
    ) -> Result<ActionResponse, TransportError> {
        let request = self.build_request(action.as_str(), payload)?;
        self.transport.send(request).await
    }

    /// Send a request built elsewhere, e.g. a deliberate resend.
    pub async fn send(&self, request: ActionRequest) -> Result<ActionResponse, TransportError> {
        self.transport.send(request).await
    }
}
