//! Runtime configuration from `SG_*` environment variables.

use gateway_telemetry::TelemetryConfig;
use semblance_gateway::GatewayConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which `KeyValueStore` backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    RocksDb,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub store: StoreBackend,
    pub gateway: GatewayConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("SG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let socket_path = lookup("SG_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("gateway.sock"));

        let store = match lookup("SG_STORE").as_deref() {
            None | Some("file") => StoreBackend::File,
            Some("rocksdb") => StoreBackend::RocksDb,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "SG_STORE",
                    value: other.to_string(),
                    reason: "expected `file` or `rocksdb`".to_string(),
                })
            }
        };

        let mut gateway = GatewayConfig::default();
        if let Some(secs) = parse::<u64>(&lookup, "SG_FRESHNESS_WINDOW_SECS")? {
            gateway.freshness_window = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "SG_RATE_WINDOW_SECS")? {
            gateway.rate_limits.window = Duration::from_secs(secs);
        }
        if let Some(limit) = parse(&lookup, "SG_RATE_GLOBAL_LIMIT")? {
            gateway.rate_limits.global_limit = limit;
        }
        if let Some(limit) = parse(&lookup, "SG_RATE_DEFAULT_ACTION_LIMIT")? {
            gateway.rate_limits.default_action_limit = limit;
        }
        if let Some(threshold) = parse(&lookup, "SG_BURST_THRESHOLD")? {
            gateway.anomaly.burst_threshold = threshold;
        }
        if let Some(secs) = parse::<u64>(&lookup, "SG_BURST_WINDOW_SECS")? {
            gateway.anomaly.burst_window = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse(&lookup, "SG_LARGE_PAYLOAD_BYTES")? {
            gateway.anomaly.large_payload_bytes = bytes;
        }
        if let Some(tier) = parse(&lookup, "SG_AUTONOMY_TIER")? {
            gateway.autonomy_tier = tier;
        }
        if let Some(domain) = lookup("SG_SEARCH_PROVIDER") {
            gateway.search_provider_domain = domain;
        }

        Ok(Self {
            data_dir,
            socket_path,
            store,
            gateway,
        })
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig::from_env()
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::AutonomyTier;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.socket_path, PathBuf::from("./data/gateway.sock"));
        assert_eq!(config.store, StoreBackend::File);
        assert_eq!(config.gateway.freshness_window, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SG_DATA_DIR", "/var/lib/sg"),
            ("SG_RATE_GLOBAL_LIMIT", "500"),
            ("SG_BURST_WINDOW_SECS", "10"),
            ("SG_AUTONOMY_TIER", "alter_ego"),
        ])
        .unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/var/lib/sg/gateway.sock"));
        assert_eq!(config.gateway.rate_limits.global_limit, 500);
        assert_eq!(config.gateway.anomaly.burst_window, Duration::from_secs(10));
        assert_eq!(config.gateway.autonomy_tier, AutonomyTier::AlterEgo);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = config(&[("SG_RATE_GLOBAL_LIMIT", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "SG_RATE_GLOBAL_LIMIT",
                ..
            }
        ));
        assert!(err.to_string().starts_with("SG_RATE_GLOBAL_LIMIT="));
    }

    #[test]
    fn test_unknown_store() {
        assert!(config(&[("SG_STORE", "postgres")]).is_err());
    }
}
