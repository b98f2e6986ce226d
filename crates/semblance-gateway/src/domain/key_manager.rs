//! # Key Manager
//!
//! Owns the lifecycle of the Core ↔ Gateway HMAC key: generated once on
//! first use, persisted under `signing_key/<name>`, cached afterwards.
//!
//! ## Security Properties
//!
//! - The key never leaves this component except as a `SigningKey`, which
//!   zeroizes on drop and redacts itself in `Debug`.
//! - `regenerate` invalidates every request signed with the old key. It is
//!   an administrative operation and is logged at `warn`.

use crate::domain::errors::KeyError;
use crate::ports::outbound::KeyValueStore;
use parking_lot::RwLock;
use shared_crypto::SigningKey;
use std::sync::Arc;
use tracing::{info, warn};

const PREFIX: &str = "signing_key/";

pub struct KeyManager {
    store: Arc<dyn KeyValueStore>,
    name: String,
    cached: RwLock<Option<SigningKey>>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signing key, loading or creating it on first call.
    pub fn get_key(&self) -> Result<SigningKey, KeyError> {
        if let Some(key) = self.cached.read().as_ref() {
            return Ok(key.clone());
        }

        let mut cached = self.cached.write();
        // Another caller may have won the race for the write lock.
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.store.get(self.storage_key().as_bytes())? {
            Some(stored) => {
                let encoded = String::from_utf8_lossy(&stored);
                SigningKey::from_hex(encoded.trim())?
            }
            None => {
                let key = SigningKey::generate();
                self.persist(&key)?;
                info!(component = "key_manager", key_name = %self.name, "Signing key generated");
                key
            }
        };
        *cached = Some(key.clone());
        Ok(key)
    }

    /// Replace the stored key with a fresh one.
    pub fn regenerate(&self) -> Result<SigningKey, KeyError> {
        let mut cached = self.cached.write();
        let key = SigningKey::generate();
        self.persist(&key)?;
        *cached = Some(key.clone());

        warn!(
            component = "key_manager",
            key_name = %self.name,
            "Signing key regenerated; requests signed with the previous key will be rejected"
        );
        Ok(key)
    }

    fn storage_key(&self) -> String {
        format!("{PREFIX}{}", self.name)
    }

    fn persist(&self, key: &SigningKey) -> Result<(), KeyError> {
        self.store
            .put(self.storage_key().as_bytes(), key.to_hex().as_bytes())?;
        Ok(())
    }
}
