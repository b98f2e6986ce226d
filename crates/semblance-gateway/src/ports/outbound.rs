//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the Gateway requires from its host.
//!
//! Production: `FileBackedKVStore` or `RocksDbStore`, `SystemClock`,
//! `HandlerRegistry` populated with service adapters.
//! Testing: `InMemoryKVStore`, `ManualClock`, stub handlers.

use crate::domain::anomaly::AnomalyReport;
use crate::domain::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use shared_types::{ActionPayload, ActionType};
use thiserror::Error;

// =============================================================================
// STORAGE
// =============================================================================

/// Ordered `(key, value)` pairs returned by a prefix scan.
pub type ScanResult = Vec<(Vec<u8>, Vec<u8>)>;

/// Abstract interface for key-value persistence.
///
/// Methods take `&self`; implementations synchronize internally so the
/// store can be shared between components as `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Either ALL operations in the batch are applied, or NONE are.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All pairs whose key starts with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, StoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Abstract interface for time (for testability).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// =============================================================================
// SERVICE DISPATCH
// =============================================================================

/// Failure reported by a service handler. `code` reaches the caller as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Executes one kind of action against an external service.
///
/// Called only after the request passed every check, with a payload that
/// already matched the action's schema.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, payload: &ActionPayload) -> Result<Value, HandlerError>;
}

/// Routes a validated action to whatever executes it.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn dispatch(&self, action: ActionType, payload: &ActionPayload)
        -> Result<Value, HandlerError>;
}

// =============================================================================
// ANOMALY REPORTING
// =============================================================================

/// Receives advisory anomaly reports. Must not block or fail the request.
pub trait AnomalySink: Send + Sync {
    fn report(&self, request_id: &str, action: ActionType, report: &AnomalyReport);
}
