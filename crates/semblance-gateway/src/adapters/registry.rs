//! Handler registry: the production `ServiceRegistry`.
//!
//! Handlers are keyed by `ActionType`, so routing is an enum lookup rather
//! than string matching. A known action with no handler fails with
//! `HANDLER_NOT_CONFIGURED_ERROR`, which is audited like any handler error.

use crate::ports::outbound::{ActionHandler, HandlerError, ServiceRegistry};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use shared_types::errors::HANDLER_NOT_CONFIGURED;
use shared_types::{ActionPayload, ActionType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<ActionType, Arc<dyn ActionHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `action`, replacing any previous one.
    pub fn register(&self, action: ActionType, handler: Arc<dyn ActionHandler>) {
        self.handlers.write().insert(action, handler);
        debug!(component = "registry", action = %action, "Handler registered");
    }

    /// Builder-style `register`.
    pub fn with_handler(self, action: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action, handler);
        self
    }

    pub fn is_registered(&self, action: ActionType) -> bool {
        self.handlers.read().contains_key(&action)
    }

    /// Actions with a handler, in catalog order.
    pub fn registered(&self) -> Vec<ActionType> {
        let handlers = self.handlers.read();
        ActionType::ALL
            .into_iter()
            .filter(|a| handlers.contains_key(a))
            .collect()
    }
}

#[async_trait]
impl ServiceRegistry for HandlerRegistry {
    async fn dispatch(
        &self,
        action: ActionType,
        payload: &ActionPayload,
    ) -> Result<Value, HandlerError> {
        // Clone out of the lock; handlers run across await points.
        let handler = self.handlers.read().get(&action).cloned();
        match handler {
            Some(handler) => handler.execute(payload).await,
            None => Err(HandlerError::new(
                HANDLER_NOT_CONFIGURED,
                format!("no handler configured for {action}"),
            )),
        }
    }
}
