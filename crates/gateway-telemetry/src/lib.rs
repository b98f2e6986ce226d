//! # Gateway Telemetry
//!
//! Local observability for the Semblance Gateway.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON output
//! - **Metrics**: Prometheus counters in a process-local registry
//!
//! Nothing here pushes telemetry off the machine. The Gateway may only talk
//! to allow-listed destinations, and a collector endpoint is not one of them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and counters are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SG_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `SG_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `SG_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |

mod config;
pub mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    gather_text, register_metrics, MetricsHandle, ANOMALIES_TOTAL, AUDIT_ENTRIES_TOTAL,
    DISPATCH_DURATION, REJECTIONS_TOTAL, REQUESTS_TOTAL,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the process.
/// Calling this twice returns `TelemetryError::AlreadyInitialized`.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
