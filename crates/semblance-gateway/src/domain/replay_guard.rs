//! # Replay Guard
//!
//! Two mandatory checks, run right after signature verification and before
//! anything is written:
//!
//! 1. **Freshness** - `|now - timestamp| <= window`, in both directions.
//!    A timestamp from the future is forged skew, not a clock quirk.
//! 2. **Deduplication** - an id may be used once.
//!
//! ## Retention
//!
//! An id only needs remembering while its timestamp could still pass the
//! freshness check, i.e. until `timestamp + window`. Entries are evicted past
//! that point, so memory is bounded by the request rate times the window.

use crate::domain::errors::GatewayError;
use crate::ports::outbound::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct SeenIds {
    /// id -> instant after which the id can no longer pass freshness
    expiry: HashMap<String, DateTime<Utc>>,
    /// Insertion order for eviction, paired with the expiry
    order: VecDeque<(DateTime<Utc>, String)>,
}

pub struct ReplayGuard {
    window: chrono::Duration,
    clock: Arc<dyn Clock>,
    seen: Mutex<SeenIds>,
}

impl ReplayGuard {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            clock,
            seen: Mutex::new(SeenIds::default()),
        }
    }

    /// Parse `timestamp` and check it against the freshness window.
    ///
    /// An unparseable timestamp is stale by definition.
    pub fn check_freshness(&self, timestamp: &str) -> Result<DateTime<Utc>, GatewayError> {
        let stale = || GatewayError::TimestampStale {
            timestamp: timestamp.to_string(),
        };
        let issued_at = DateTime::parse_from_rfc3339(timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| stale())?;

        let skew = (self.clock.now() - issued_at).abs();
        if skew > self.window {
            return Err(stale());
        }
        Ok(issued_at)
    }

    /// Record `id`, failing if it was already recorded and not yet expired.
    ///
    /// `issued_at` is the request's (already fresh) timestamp.
    pub fn check_and_record(&self, id: &str, issued_at: DateTime<Utc>) -> Result<(), GatewayError> {
        let now = self.clock.now();
        let mut seen = self.seen.lock();

        while seen.order.front().is_some_and(|(expires, _)| *expires < now) {
            if let Some((_, old)) = seen.order.pop_front() {
                seen.expiry.remove(&old);
            }
        }

        if seen.expiry.contains_key(id) {
            return Err(GatewayError::RequestReplayed { id: id.to_string() });
        }

        let expires = issued_at + self.window;
        seen.expiry.insert(id.to_string(), expires);
        // Expiries arrive out of order when clients skew; keep the queue
        // sorted so the front is always the next to expire.
        let position = seen.order.partition_point(|(e, _)| *e <= expires);
        seen.order.insert(position, (expires, id.to_string()));

        debug!(request_id = %id, tracked = seen.expiry.len(), "Request id recorded");
        Ok(())
    }

    /// Number of ids currently remembered.
    pub fn tracked(&self) -> usize {
        self.seen.lock().expiry.len()
    }

    /// Forget all ids.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&self) {
        *self.seen.lock() = SeenIds::default();
    }
}
