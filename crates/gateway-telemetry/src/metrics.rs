//! Prometheus metrics for the Gateway.
//!
//! All metrics follow the naming convention: `gateway_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: outcomes, rejections by code, anomalies by kind
//! - **Histogram**: handler dispatch latency

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Process-local metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests by final outcome (success/error/rejected)
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_requests_total", "Requests processed by the gateway"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Rejections by wire error code
    pub static ref REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_rejections_total", "Requests rejected by the validation pipeline"),
        &["code"]
    ).expect("metric creation failed");

    /// Advisory anomaly flags by kind
    pub static ref ANOMALIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gateway_anomalies_total", "Anomalies flagged (advisory)"),
        &["kind"]
    ).expect("metric creation failed");

    /// Audit rows appended
    pub static ref AUDIT_ENTRIES_TOTAL: IntCounter = IntCounter::new(
        "gateway_audit_entries_total",
        "Rows appended to the audit chain"
    ).expect("metric creation failed");

    /// Handler dispatch duration
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gateway_dispatch_duration_seconds",
            "Time spent inside action handlers"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid bucket layout"))
    ).expect("metric creation failed");
}

/// Handle proving the metrics are registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(REJECTIONS_TOTAL.clone()),
        Box::new(ANOMALIES_TOTAL.clone()),
        Box::new(AUDIT_ENTRIES_TOTAL.clone()),
        Box::new(DISPATCH_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    register_metrics()?;
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
