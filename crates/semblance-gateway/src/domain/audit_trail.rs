//! # Audit Trail
//!
//! Append-only, hash-chained record of every request that got past
//! authentication and replay checks.
//!
//! ## Chain
//!
//! ```text
//! chain_hash[n] = sha256hex(chain_hash[n-1] ‖ canonical_json(row[n] without chainHash))
//! chain_hash[-1] = GENESIS_CHAIN_HASH
//! ```
//!
//! Editing any historical row changes its recomputed link and therefore every
//! link after it. This is tamper evidence only; the store itself still relies
//! on file permissions.
//!
//! ## Records and Rows
//!
//! A logical record (one `auditRef`) is a sequence of rows sharing `id`, e.g.
//! `pending` then `success`. Rows are never updated in place.
//!
//! ## Concurrency
//!
//! The chain tail is behind a mutex that is held across the store write, so
//! two appends can never link from the same predecessor.

use crate::domain::errors::{AuditError, StoreError};
use crate::domain::format_timestamp;
use crate::ports::outbound::{Clock, KeyValueStore};
use chrono::{DateTime, SubsecRound, Utc};
use gateway_telemetry::AUDIT_ENTRIES_TOTAL;
use parking_lot::Mutex;
use serde_json::Value;
use shared_crypto::{canonical_json, chain_hash, GENESIS_CHAIN_HASH};
use shared_types::errors::GATEWAY_INTERRUPTED;
use shared_types::{AuditEntry, AuditStatus, AutonomyTier};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

const PREFIX: &str = "audit/";

fn row_key(sequence: u64) -> String {
    format!("{PREFIX}{sequence:020}")
}

/// A row before the trail assigns `sequence`, `timestamp` and `chain_hash`.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub id: String,
    pub request_id: String,
    pub action: String,
    pub payload_hash: String,
    pub status: AuditStatus,
    pub error_code: Option<String>,
    pub autonomy_tier: AutonomyTier,
    pub approval_required: bool,
    pub approval_given: bool,
    pub estimated_time_saved_seconds: u32,
    pub response_hash: Option<String>,
}

impl NewAuditEntry {
    /// Follow-up row for the same record with a new status.
    pub fn transition(row: &AuditEntry, status: AuditStatus) -> Self {
        Self {
            id: row.id.clone(),
            request_id: row.request_id.clone(),
            action: row.action.clone(),
            payload_hash: row.payload_hash.clone(),
            status,
            error_code: None,
            autonomy_tier: row.autonomy_tier,
            approval_required: row.approval_required,
            approval_given: row.approval_given,
            estimated_time_saved_seconds: row.estimated_time_saved_seconds,
            response_hash: None,
        }
    }
}

/// All rows of one `auditRef`, folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub id: String,
    pub request_id: String,
    pub action: String,
    /// Status of the latest row.
    pub status: AuditStatus,
    pub transitions: Vec<AuditStatus>,
    pub rows: Vec<AuditEntry>,
}

/// Result of `verify_chain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    pub rows_checked: usize,
    /// Sequence of the first row whose stored link does not match.
    pub first_divergence: Option<u64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_divergence.is_none()
    }
}

/// Canonical bytes a row's link covers.
fn canonical_without_link(entry: &AuditEntry) -> Result<String, AuditError> {
    let mut value =
        serde_json::to_value(entry).map_err(|e| AuditError::Encoding(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.remove("chainHash");
    }
    canonical_json(&value).map_err(|e| AuditError::Encoding(e.to_string()))
}

/// Recompute every link from genesis, ignoring the stored `chain_hash`
/// values except as output positions.
pub fn recompute_chain(entries: &[AuditEntry]) -> Result<Vec<String>, AuditError> {
    let mut previous = GENESIS_CHAIN_HASH.to_string();
    let mut links = Vec::with_capacity(entries.len());
    for entry in entries {
        let link = chain_hash(&previous, &canonical_without_link(entry)?);
        links.push(link.clone());
        previous = link;
    }
    Ok(links)
}

struct Tail {
    next_sequence: u64,
    last_hash: String,
}

pub struct AuditTrail {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    tail: Mutex<Tail>,
}

impl AuditTrail {
    /// Open the trail, resuming the chain from the last stored row.
    pub fn open(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Result<Self, AuditError> {
        let rows = Self::scan(store.as_ref())?;
        let tail = match rows.last() {
            Some(last) => Tail {
                next_sequence: last.sequence + 1,
                last_hash: last.chain_hash.clone(),
            },
            None => Tail {
                next_sequence: 0,
                last_hash: GENESIS_CHAIN_HASH.to_string(),
            },
        };
        debug!(component = "audit", rows = rows.len(), "Audit trail opened");

        Ok(Self {
            store,
            clock,
            tail: Mutex::new(tail),
        })
    }

    /// Link and persist one row.
    pub fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, AuditError> {
        let mut tail = self.tail.lock();

        let mut row = AuditEntry {
            id: entry.id,
            sequence: tail.next_sequence,
            request_id: entry.request_id,
            timestamp: format_timestamp(self.clock.now()),
            action: entry.action,
            payload_hash: entry.payload_hash,
            status: entry.status,
            error_code: entry.error_code,
            autonomy_tier: entry.autonomy_tier,
            approval_required: entry.approval_required,
            approval_given: entry.approval_given,
            estimated_time_saved_seconds: entry.estimated_time_saved_seconds,
            response_hash: entry.response_hash,
            chain_hash: String::new(),
        };
        row.chain_hash = chain_hash(&tail.last_hash, &canonical_without_link(&row)?);

        let value = serde_json::to_vec(&row).map_err(|e| AuditError::Encoding(e.to_string()))?;
        self.store.put(row_key(row.sequence).as_bytes(), &value)?;

        tail.next_sequence += 1;
        tail.last_hash = row.chain_hash.clone();
        drop(tail);

        gateway_telemetry::metric_inc!(AUDIT_ENTRIES_TOTAL);
        debug!(
            component = "audit",
            audit_ref = %row.id,
            request_id = %row.request_id,
            sequence = row.sequence,
            status = %row.status,
            "Audit row appended"
        );
        Ok(row)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Every row in sequence order.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Self::scan(self.store.as_ref())
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    /// Number of distinct records.
    pub fn record_count(&self) -> Result<usize, AuditError> {
        let mut ids: Vec<_> = self.entries()?.into_iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids.len())
    }

    pub fn by_request_id(&self, request_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        self.filtered(|e| e.request_id == request_id)
    }

    pub fn by_action(&self, action: &str) -> Result<Vec<AuditEntry>, AuditError> {
        self.filtered(|e| e.action == action)
    }

    /// Rows written in `[from, to]`. Row timestamps are stored to the
    /// millisecond, so both bounds are truncated the same way.
    pub fn in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let (from, to) = (from.trunc_subsecs(3), to.trunc_subsecs(3));
        self.filtered(|e| {
            DateTime::parse_from_rfc3339(&e.timestamp)
                .map(|at| {
                    let at = at.with_timezone(&Utc);
                    at >= from && at <= to
                })
                .unwrap_or(false)
        })
    }

    /// Fold the rows of `id` into a record.
    pub fn record(&self, id: &str) -> Result<Option<AuditRecord>, AuditError> {
        let rows = self.filtered(|e| e.id == id)?;
        Ok(Self::fold(rows))
    }

    // =========================================================================
    // INTEGRITY
    // =========================================================================

    /// Recompute the chain and compare it against the stored links.
    pub fn verify_chain(&self) -> Result<ChainVerification, AuditError> {
        let rows = self.entries()?;
        let links = recompute_chain(&rows)?;
        let first_divergence = rows
            .iter()
            .zip(links.iter())
            .find(|(row, link)| row.chain_hash != **link)
            .map(|(row, _)| row.sequence);

        if let Some(sequence) = first_divergence {
            warn!(component = "audit", sequence, "Audit chain diverges");
        }
        Ok(ChainVerification {
            rows_checked: rows.len(),
            first_divergence,
        })
    }

    /// Close every record whose last row is still `pending` with an `error`
    /// row coded `GATEWAY_INTERRUPTED`. Returns the closed `auditRef`s.
    pub fn reconcile_pending(&self) -> Result<Vec<String>, AuditError> {
        let mut last_rows: BTreeMap<String, AuditEntry> = BTreeMap::new();
        for row in self.entries()? {
            last_rows.insert(row.id.clone(), row);
        }

        let mut closed = Vec::new();
        for row in last_rows.values().filter(|r| r.status == AuditStatus::Pending) {
            let mut entry = NewAuditEntry::transition(row, AuditStatus::Error);
            entry.error_code = Some(GATEWAY_INTERRUPTED.to_string());
            self.append(entry)?;

            warn!(
                component = "audit",
                audit_ref = %row.id,
                request_id = %row.request_id,
                "Closed audit record interrupted mid-dispatch"
            );
            closed.push(row.id.clone());
        }
        Ok(closed)
    }

    fn filtered(&self, keep: impl Fn(&AuditEntry) -> bool) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.entries()?.into_iter().filter(|e| keep(e)).collect())
    }

    fn fold(rows: Vec<AuditEntry>) -> Option<AuditRecord> {
        let first = rows.first()?;
        let last = rows.last()?;
        Some(AuditRecord {
            id: first.id.clone(),
            request_id: first.request_id.clone(),
            action: first.action.clone(),
            status: last.status,
            transitions: rows.iter().map(|r| r.status).collect(),
            rows,
        })
    }

    fn scan(store: &dyn KeyValueStore) -> Result<Vec<AuditEntry>, AuditError> {
        store
            .prefix_scan(PREFIX.as_bytes())?
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_slice(&value)
                    .map_err(|e| AuditError::Store(StoreError::corruption(e)))
            })
            .collect()
    }
}
