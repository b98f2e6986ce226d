//! # Allow-list
//!
//! The durable, default-deny set of destinations the Gateway may contact.
//!
//! ## Rules
//!
//! - Domains are stored normalized: lowercase, one trailing dot stripped.
//! - Wildcards are refused at insertion. Every host is granted explicitly.
//! - An entry with `port = None` matches any port on its domain.
//! - Entries are never deleted, only deactivated, so the store keeps a
//!   record of everything that was ever granted.
//!
//! Rows live under `allowlist/<id>`; an in-memory copy answers lookups.

use crate::domain::errors::AllowlistError;
use crate::domain::format_timestamp;
use crate::ports::outbound::{Clock, KeyValueStore};
use parking_lot::RwLock;
use shared_types::{AllowedService, Protocol};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const PREFIX: &str = "allowlist/";

/// Request to grant a destination.
#[derive(Debug, Clone)]
pub struct NewService {
    pub service_name: String,
    pub domain: String,
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub added_by: String,
}

/// Lowercase, strip one trailing dot, refuse wildcards and anything that is
/// not a bare hostname.
pub fn normalize_domain(raw: &str) -> Result<String, AllowlistError> {
    let trimmed = raw.trim();
    if trimmed.contains('*') {
        return Err(AllowlistError::WildcardDomain(raw.to_string()));
    }
    let domain = trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .to_ascii_lowercase();

    let valid = !domain.is_empty()
        && domain.len() <= 253
        && domain
            .split('.')
            .all(|label| !label.is_empty() && label.len() <= 63)
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(AllowlistError::InvalidDomain(raw.to_string()));
    }
    Ok(domain)
}

pub struct Allowlist {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    entries: RwLock<Vec<AllowedService>>,
}

impl Allowlist {
    /// Load every stored entry.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AllowlistError> {
        let entries = store
            .prefix_scan(PREFIX.as_bytes())?
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_slice::<AllowedService>(&value)
                    .map_err(|e| crate::domain::errors::StoreError::corruption(e).into())
            })
            .collect::<Result<Vec<_>, AllowlistError>>()?;

        Ok(Self {
            store,
            clock,
            entries: RwLock::new(entries),
        })
    }

    /// Grant a destination. Re-adding an active `(domain, port, protocol)`
    /// returns the existing entry.
    pub fn add_service(&self, service: NewService) -> Result<AllowedService, AllowlistError> {
        let domain = normalize_domain(&service.domain)?;
        let mut entries = self.entries.write();

        if let Some(existing) = entries.iter().find(|e| {
            e.is_active
                && e.domain == domain
                && e.port == service.port
                && e.protocol == service.protocol
        }) {
            return Ok(existing.clone());
        }

        let entry = AllowedService {
            id: Uuid::new_v4().to_string(),
            service_name: service.service_name,
            domain,
            port: service.port,
            protocol: service.protocol,
            added_at: format_timestamp(self.clock.now()),
            added_by: service.added_by,
            is_active: true,
        };
        self.persist(&entry)?;
        entries.push(entry.clone());

        info!(
            component = "allowlist",
            id = %entry.id,
            domain = %entry.domain,
            port = ?entry.port,
            "Destination allow-listed"
        );
        Ok(entry)
    }

    /// Soft-disable an entry. The row is kept.
    pub fn deactivate_service(&self, id: &str) -> Result<AllowedService, AllowlistError> {
        self.set_active(id, false)
    }

    pub fn reactivate_service(&self, id: &str) -> Result<AllowedService, AllowlistError> {
        self.set_active(id, true)
    }

    /// Whether `domain` (and `port`, when known) is currently granted.
    ///
    /// With `port = None` any active entry for the domain matches.
    pub fn is_allowed(&self, domain: &str, port: Option<u16>) -> bool {
        let Ok(domain) = normalize_domain(domain) else {
            return false;
        };
        self.entries.read().iter().any(|e| {
            e.is_active
                && e.domain == domain
                && match (e.port, port) {
                    (None, _) | (_, None) => true,
                    (Some(granted), Some(requested)) => granted == requested,
                }
        })
    }

    pub fn get(&self, id: &str) -> Option<AllowedService> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// Entries ordered by `added_at`.
    pub fn list(&self, include_inactive: bool) -> Vec<AllowedService> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|e| include_inactive || e.is_active)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Distinct domains of active entries.
    pub fn active_domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.domain.clone())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    fn set_active(&self, id: &str, active: bool) -> Result<AllowedService, AllowlistError> {
        let mut entries = self.entries.write();
        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| AllowlistError::NotFound(id.to_string()))?;

        let mut updated = entries[index].clone();
        updated.is_active = active;
        self.persist(&updated)?;
        entries[index] = updated.clone();

        info!(
            component = "allowlist",
            id = %id,
            domain = %updated.domain,
            active,
            "Allow-list entry updated"
        );
        Ok(updated)
    }

    fn persist(&self, entry: &AllowedService) -> Result<(), AllowlistError> {
        let value = serde_json::to_vec(entry)
            .map_err(crate::domain::errors::StoreError::corruption)?;
        self.store
            .put(format!("{PREFIX}{}", entry.id).as_bytes(), &value)?;
        Ok(())
    }
}
