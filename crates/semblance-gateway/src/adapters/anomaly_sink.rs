//! `AnomalySink` adapters.

use crate::domain::anomaly::AnomalyReport;
use crate::ports::outbound::AnomalySink;
use gateway_telemetry::ANOMALIES_TOTAL;
use shared_types::ActionType;

/// Logs each anomaly at `warn` and counts it by kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnomalySink;

impl AnomalySink for TracingAnomalySink {
    fn report(&self, request_id: &str, action: ActionType, report: &AnomalyReport) {
        for anomaly in &report.anomalies {
            gateway_telemetry::metric_inc!(ANOMALIES_TOTAL, &[anomaly.kind.as_str()]);
            gateway_telemetry::log_event!(
                warn,
                "anomaly",
                "Anomalous request flagged",
                request_id = %request_id,
                action = %action,
                kind = anomaly.kind.as_str(),
                detail = %anomaly.message
            );
        }
    }
}

/// Keeps every report in memory so tests can assert on them.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingAnomalySink {
    reports: parking_lot::Mutex<Vec<(String, ActionType, AnomalyReport)>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingAnomalySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, ActionType, AnomalyReport)> {
        self.reports.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AnomalySink for RecordingAnomalySink {
    fn report(&self, request_id: &str, action: ActionType, report: &AnomalyReport) {
        self.reports
            .lock()
            .push((request_id.to_string(), action, report.clone()));
    }
}
