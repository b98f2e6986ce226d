//! Gateway configuration.

use shared_types::{ActionType, AutonomyTier};
use std::collections::HashMap;
use std::time::Duration;

/// Default provider `web.search` is served from.
pub const DEFAULT_SEARCH_PROVIDER: &str = "api.search.brave.com";

/// Name the Core ↔ Gateway HMAC key is stored under.
pub const DEFAULT_SIGNING_KEY_NAME: &str = "core-gateway";

/// Sliding-window rate limits.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Requests per window across all actions.
    pub global_limit: u32,
    /// Per-action limit for actions without an override.
    pub default_action_limit: u32,
    pub action_limits: HashMap<ActionType, u32>,
}

impl RateLimitConfig {
    pub fn limit_for(&self, action: ActionType) -> u32 {
        self.action_limits
            .get(&action)
            .copied()
            .unwrap_or(self.default_action_limit)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            global_limit: 120,
            default_action_limit: 60,
            action_limits: ActionType::ALL
                .into_iter()
                .map(|a| (a, a.default_rate_limit()))
                .collect(),
        }
    }
}

/// Anomaly heuristics thresholds.
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// More than this many requests inside `burst_window` is a burst.
    pub burst_threshold: usize,
    pub burst_window: Duration,
    /// Canonical payload size above which a request is flagged.
    pub large_payload_bytes: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            burst_threshold: 10,
            burst_window: Duration::from_secs(5),
            large_payload_bytes: 1024 * 1024,
        }
    }
}

/// Everything the `Gateway` needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum `|now - timestamp|` accepted.
    pub freshness_window: Duration,
    pub rate_limits: RateLimitConfig,
    pub anomaly: AnomalyConfig,
    /// Tier recorded on every audit row.
    pub autonomy_tier: AutonomyTier,
    pub search_provider_domain: String,
    pub signing_key_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(30),
            rate_limits: RateLimitConfig::default(),
            anomaly: AnomalyConfig::default(),
            autonomy_tier: AutonomyTier::default(),
            search_provider_domain: DEFAULT_SEARCH_PROVIDER.to_string(),
            signing_key_name: DEFAULT_SIGNING_KEY_NAME.to_string(),
        }
    }
}
