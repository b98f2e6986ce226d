//! # Anomaly Detector
//!
//! Advisory heuristics evaluated on every request that passed the blocking
//! checks. A report never changes the request's outcome; it is handed to the
//! `AnomalySink` for the UI and the log.
//!
//! ## Signals
//!
//! | Kind | Fires when |
//! |------|------------|
//! | `burst` | more than `burst_threshold` requests inside `burst_window` |
//! | `new_domain` | first request to a domain in this process lifetime |
//! | `large_payload` | canonical payload larger than `large_payload_bytes` |

use crate::domain::allowlist::normalize_domain;
use crate::domain::config::AnomalyConfig;
use crate::ports::outbound::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Burst,
    NewDomain,
    LargePayload,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Burst => "burst",
            AnomalyKind::NewDomain => "new_domain",
            AnomalyKind::LargePayload => "large_payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub message: String,
}

/// Result of evaluating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub flagged: bool,
    pub anomalies: Vec<Anomaly>,
}

impl AnomalyReport {
    pub fn has(&self, kind: AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| a.kind == kind)
    }

    fn push(&mut self, kind: AnomalyKind, message: String) {
        self.flagged = true;
        self.anomalies.push(Anomaly { kind, message });
    }
}

/// Key under which a domain is remembered, matching allow-list spelling.
/// Hosts the allow-list cannot hold (IP literals) are only lowercased.
fn domain_key(domain: &str) -> String {
    normalize_domain(domain).unwrap_or_else(|_| domain.trim().to_ascii_lowercase())
}

#[derive(Default)]
struct DetectorState {
    recent: VecDeque<DateTime<Utc>>,
    seen_domains: HashSet<String>,
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<DetectorState>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(DetectorState::default()),
        }
    }

    /// Record one request and report which heuristics it trips.
    ///
    /// `domain` is the destination the request will contact, if any.
    /// `payload_bytes` is the size of the canonical payload.
    pub fn evaluate(&self, domain: Option<&str>, payload_bytes: usize) -> AnomalyReport {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.config.burst_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(5));
        let mut report = AnomalyReport::default();
        let mut state = self.state.lock();

        state.recent.push_back(now);
        while state
            .recent
            .front()
            .is_some_and(|oldest| *oldest <= now - window)
        {
            state.recent.pop_front();
        }
        if state.recent.len() > self.config.burst_threshold {
            report.push(
                AnomalyKind::Burst,
                format!(
                    "{} requests in the last {}s",
                    state.recent.len(),
                    self.config.burst_window.as_secs()
                ),
            );
        }

        if let Some(domain) = domain {
            let domain = domain_key(domain);
            if state.seen_domains.insert(domain.clone()) {
                report.push(
                    AnomalyKind::NewDomain,
                    format!("first request to {domain}"),
                );
            }
        }

        if payload_bytes > self.config.large_payload_bytes {
            report.push(
                AnomalyKind::LargePayload,
                format!(
                    "payload is {payload_bytes} bytes (limit {})",
                    self.config.large_payload_bytes
                ),
            );
        }

        report
    }

    /// Treat `domain` as already contacted, so it never raises `new_domain`.
    pub fn mark_domain_seen(&self, domain: &str) {
        self.state
            .lock()
            .seen_domains
            .insert(domain_key(domain));
    }

    /// Forget all history.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&self) {
        *self.state.lock() = DetectorState::default();
    }
}
