//! Direct-call transport.
//!
//! Hands the request object straight to the handler without serializing it.

use super::{ensure_correlated, IpcTransport, TransportError};
use crate::ports::inbound::RequestHandler;
use async_trait::async_trait;
use shared_types::{ActionRequest, ActionResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct InProcessTransport {
    handler: Arc<dyn RequestHandler>,
    ready: AtomicBool,
}

impl InProcessTransport {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl IpcTransport for InProcessTransport {
    async fn start(&self) -> Result<(), TransportError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn send(&self, request: ActionRequest) -> Result<ActionResponse, TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotStarted);
        }
        let request_id = request.id.clone();
        let response = self.handler.handle(request).await;
        ensure_correlated(&request_id, response)
    }
}
