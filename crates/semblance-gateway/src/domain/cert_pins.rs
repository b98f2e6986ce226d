//! # Certificate Pin Registry
//!
//! Trust-on-first-use SHA-256 fingerprint pins per domain.
//!
//! ## Lifecycle
//!
//! 1. `register_pin(domain)` creates a pin with no fingerprints (TOFU phase).
//! 2. The first successful connection calls `record_first_use`, which fills
//!    the pin exactly once.
//! 3. Later connections are compared against the stored set.
//!
//! A pin with `enforced = false` only logs mismatches, which allows a staged
//! rollout before a pin is promoted to hard-blocking.

use crate::domain::allowlist::normalize_domain;
use crate::domain::errors::{PinError, StoreError};
use crate::ports::outbound::KeyValueStore;
use parking_lot::RwLock;
use shared_types::CertificatePin;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const PREFIX: &str = "certpin/";

/// Detailed outcome of a pin check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinVerdict {
    /// No pin registered for the domain.
    NoPin,
    /// Registered, still waiting for its first fingerprint.
    Unpopulated,
    Match,
    Mismatch { enforced: bool },
}

impl PinVerdict {
    /// Whether the connection may proceed.
    pub fn permits(&self) -> bool {
        !matches!(self, PinVerdict::Mismatch { enforced: true })
    }
}

/// Lowercase, colon-free, 64 hex digits.
fn normalize_fingerprint(raw: &str) -> Result<String, PinError> {
    let fp: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase();
    if fp.len() != 64 || !fp.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PinError::InvalidFingerprint(raw.to_string()));
    }
    Ok(fp)
}

fn pin_domain(raw: &str) -> Result<String, PinError> {
    normalize_domain(raw).map_err(|_| PinError::InvalidDomain(raw.to_string()))
}

pub struct CertificatePinRegistry {
    store: Arc<dyn KeyValueStore>,
    pins: RwLock<BTreeMap<String, CertificatePin>>,
}

impl CertificatePinRegistry {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, PinError> {
        let mut pins = BTreeMap::new();
        for (_, value) in store.prefix_scan(PREFIX.as_bytes())? {
            let pin: CertificatePin =
                serde_json::from_slice(&value).map_err(StoreError::corruption)?;
            pins.insert(pin.domain.clone(), pin);
        }
        Ok(Self {
            store,
            pins: RwLock::new(pins),
        })
    }

    /// Register (or replace) the pin for `domain`. Pass no fingerprints to
    /// start in the TOFU phase.
    pub fn register_pin(
        &self,
        domain: &str,
        fingerprints: &[String],
        enforced: bool,
        description: &str,
    ) -> Result<CertificatePin, PinError> {
        let domain = pin_domain(domain)?;
        let fingerprints = fingerprints
            .iter()
            .map(|fp| normalize_fingerprint(fp))
            .collect::<Result<Vec<_>, _>>()?;

        let pin = CertificatePin {
            domain: domain.clone(),
            fingerprints,
            enforced,
            description: description.to_string(),
        };
        let mut pins = self.pins.write();
        self.persist(&pin)?;
        pins.insert(domain, pin.clone());

        info!(
            component = "cert_pins",
            domain = %pin.domain,
            enforced,
            fingerprints = pin.fingerprints.len(),
            "Certificate pin registered"
        );
        Ok(pin)
    }

    pub fn check_pin(&self, domain: &str, fingerprint: &str) -> PinVerdict {
        let Ok(domain) = normalize_domain(domain) else {
            return PinVerdict::NoPin;
        };
        let pins = self.pins.read();
        let Some(pin) = pins.get(&domain) else {
            return PinVerdict::NoPin;
        };
        if pin.fingerprints.is_empty() {
            return PinVerdict::Unpopulated;
        }
        match normalize_fingerprint(fingerprint) {
            Ok(fp) if pin.fingerprints.contains(&fp) => PinVerdict::Match,
            _ => PinVerdict::Mismatch {
                enforced: pin.enforced,
            },
        }
    }

    /// `true` when the connection may proceed. Mismatches on non-enforced
    /// pins are logged and allowed.
    pub fn verify_pin(&self, domain: &str, fingerprint: &str) -> bool {
        let verdict = self.check_pin(domain, fingerprint);
        if let PinVerdict::Mismatch { enforced } = verdict {
            warn!(
                component = "cert_pins",
                domain = %domain,
                enforced,
                "Certificate fingerprint does not match pin"
            );
        }
        verdict.permits()
    }

    /// Populate an unpopulated pin. Returns `true` when a fingerprint was
    /// recorded; a no-op for populated or unregistered domains.
    pub fn record_first_use(&self, domain: &str, fingerprint: &str) -> Result<bool, PinError> {
        let Ok(domain) = normalize_domain(domain) else {
            return Ok(false);
        };
        let fingerprint = normalize_fingerprint(fingerprint)?;

        let mut pins = self.pins.write();
        let Some(pin) = pins.get(&domain) else {
            return Ok(false);
        };
        if !pin.fingerprints.is_empty() {
            return Ok(false);
        }

        let mut updated = pin.clone();
        updated.fingerprints.push(fingerprint);
        self.persist(&updated)?;
        pins.insert(domain.clone(), updated);

        info!(component = "cert_pins", domain = %domain, "Pinned on first use");
        Ok(true)
    }

    pub fn set_enforced(&self, domain: &str, enforced: bool) -> Result<CertificatePin, PinError> {
        let domain = pin_domain(domain)?;
        let mut pins = self.pins.write();
        let pin = pins
            .get(&domain)
            .ok_or_else(|| PinError::NotFound(domain.clone()))?;

        let mut updated = pin.clone();
        updated.enforced = enforced;
        self.persist(&updated)?;
        pins.insert(domain.clone(), updated.clone());

        info!(component = "cert_pins", domain = %domain, enforced, "Pin enforcement changed");
        Ok(updated)
    }

    pub fn get(&self, domain: &str) -> Option<CertificatePin> {
        let domain = normalize_domain(domain).ok()?;
        self.pins.read().get(&domain).cloned()
    }

    /// All pins ordered by domain.
    pub fn list(&self) -> Vec<CertificatePin> {
        self.pins.read().values().cloned().collect()
    }

    fn persist(&self, pin: &CertificatePin) -> Result<(), PinError> {
        let value = serde_json::to_vec(pin).map_err(StoreError::corruption)?;
        self.store
            .put(format!("{PREFIX}{}", pin.domain).as_bytes(), &value)?;
        Ok(())
    }
}
