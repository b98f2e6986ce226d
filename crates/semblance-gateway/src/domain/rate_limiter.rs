//! # Rate Limiter
//!
//! Sliding-window counters, one global and one per action type. A request
//! is admitted only if both windows have room, and only admitted requests
//! are counted, so a client hammering a limited action does not also
//! exhaust its other actions.
//!
//! State is in memory only. A restart clears every window.

use crate::domain::config::RateLimitConfig;
use crate::domain::errors::RateScope;
use crate::ports::outbound::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared_types::ActionType;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited {
        scope: RateScope,
        /// Time until the oldest counted request leaves the window.
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Default)]
struct Windows {
    global: VecDeque<DateTime<Utc>>,
    per_action: HashMap<ActionType, VecDeque<DateTime<Utc>>>,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    window: chrono::Duration,
    clock: Arc<dyn Clock>,
    // One lock for both levels: a request is counted in both or in neither.
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let window = chrono::Duration::from_std(config.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        Self {
            config,
            window,
            clock,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Admit or refuse one request for `action`.
    pub fn check(&self, action: ActionType) -> RateDecision {
        let now = self.clock.now();
        let cutoff = now - self.window;
        let mut guard = self.windows.lock();
        let windows = &mut *guard;

        prune(&mut windows.global, cutoff);
        if windows.global.len() >= self.config.global_limit as usize {
            return self.limited(RateScope::Global, &windows.global, now);
        }

        let per_action = windows.per_action.entry(action).or_default();
        prune(per_action, cutoff);
        if per_action.len() >= self.config.limit_for(action) as usize {
            return self.limited(RateScope::Action(action), per_action, now);
        }

        per_action.push_back(now);
        windows.global.push_back(now);
        RateDecision::Allowed
    }

    /// Requests currently counted against `action`.
    pub fn usage(&self, action: ActionType) -> usize {
        let cutoff = self.clock.now() - self.window;
        self.windows
            .lock()
            .per_action
            .get(&action)
            .map(|w| w.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0)
    }

    fn limited(
        &self,
        scope: RateScope,
        window: &VecDeque<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RateDecision {
        let retry_after = window
            .front()
            .map(|oldest| *oldest + self.window - now)
            .and_then(|d| d.to_std().ok())
            .unwrap_or(self.config.window);
        RateDecision::Limited { scope, retry_after }
    }

    /// Clear every window.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset(&self) {
        *self.windows.lock() = Windows::default();
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while window.front().is_some_and(|t| *t <= cutoff) {
        window.pop_front();
    }
}
