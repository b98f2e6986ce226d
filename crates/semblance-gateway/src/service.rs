//! # Gateway Service
//!
//! The orchestrator. Owns one instance of every pipeline component and runs
//! each request through them in a fixed order:
//!
//! ```text
//! received
//!   ─► signature ─► freshness ─► replay          (pre-audit: never written to the trail)
//!   ─► action name ─► schema ─► allow-list ─► rate limit
//!                                                (rejections audited as `rejected`)
//!   ─► anomaly evaluation                        (advisory, never blocks)
//!   ─► audit(pending) ─► dispatch ─► audit(success | error)
//!   ─► responded
//! ```
//!
//! ## Security Properties
//!
//! - Nothing is written to the audit trail until the request is
//!   authenticated, fresh, and new, so forged or replayed traffic cannot
//!   pollute the trail.
//! - No dispatch happens without a durable `pending` row. If that write
//!   fails the request is refused with `INTERNAL_ERROR`.
//! - Internal failures reach the caller as a generic message. The signing
//!   key, store errors and payload bodies only ever go to the log, and the
//!   payload only as its hash.
//!
//! ## Crash Consistency
//!
//! A crash between the `pending` row and the final row leaves the record
//! open. `Gateway::new` closes every such record with an `error` row coded
//! `GATEWAY_INTERRUPTED` before serving traffic.

use crate::domain::allowlist::Allowlist;
use crate::domain::anomaly::AnomalyDetector;
use crate::domain::audit_trail::{AuditTrail, NewAuditEntry};
use crate::domain::cert_pins::CertificatePinRegistry;
use crate::domain::config::GatewayConfig;
use crate::domain::errors::{GatewayError, KeyError, StartupError};
use crate::domain::format_timestamp;
use crate::domain::key_manager::KeyManager;
use crate::domain::rate_limiter::{RateDecision, RateLimiter};
use crate::domain::replay_guard::ReplayGuard;
use crate::ports::inbound::RequestHandler;
use crate::ports::outbound::{AnomalySink, Clock, KeyValueStore, ServiceRegistry};
use async_trait::async_trait;
use gateway_telemetry::{DISPATCH_DURATION, REJECTIONS_TOTAL, REQUESTS_TOTAL};
use serde_json::Value;
use shared_crypto::{canonical_json, sha256_hex, sha256_hex_json, SigningKey};
use shared_types::{
    ActionError, ActionPayload, ActionRequest, ActionResponse, ActionType, AuditEntry,
    AuditStatus, NetworkTarget, UnknownAction,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A request that passed every blocking check.
struct Admitted {
    action: ActionType,
    payload: ActionPayload,
    target: Option<NetworkTarget>,
}

pub struct Gateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    keys: KeyManager,
    replay: ReplayGuard,
    allowlist: Allowlist,
    rate_limiter: RateLimiter,
    anomaly: AnomalyDetector,
    pins: CertificatePinRegistry,
    audit: AuditTrail,
    registry: Arc<dyn ServiceRegistry>,
    anomaly_sink: Arc<dyn AnomalySink>,
}

impl Gateway {
    /// Load persistent state, close interrupted audit records and seed the
    /// anomaly detector with every allow-listed domain.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        registry: Arc<dyn ServiceRegistry>,
        anomaly_sink: Arc<dyn AnomalySink>,
    ) -> Result<Self, StartupError> {
        let keys = KeyManager::new(Arc::clone(&store), config.signing_key_name.clone());
        let allowlist = Allowlist::load(Arc::clone(&store), Arc::clone(&clock))?;
        let pins = CertificatePinRegistry::load(Arc::clone(&store))?;
        let audit = AuditTrail::open(Arc::clone(&store), Arc::clone(&clock))?;

        let interrupted = audit.reconcile_pending()?;
        if !interrupted.is_empty() {
            warn!(
                component = "pipeline",
                count = interrupted.len(),
                "Closed audit records left pending by a previous run"
            );
        }

        let anomaly = AnomalyDetector::new(config.anomaly.clone(), Arc::clone(&clock));
        for domain in allowlist.active_domains() {
            anomaly.mark_domain_seen(&domain);
        }

        info!(
            component = "pipeline",
            autonomy_tier = config.autonomy_tier.as_str(),
            allowlisted = allowlist.list(false).len(),
            "Gateway ready"
        );

        Ok(Self {
            replay: ReplayGuard::new(config.freshness_window, Arc::clone(&clock)),
            rate_limiter: RateLimiter::new(config.rate_limits.clone(), Arc::clone(&clock)),
            config,
            clock,
            keys,
            allowlist,
            anomaly,
            pins,
            audit,
            registry,
            anomaly_sink,
        })
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Validate `request`, dispatch it if every check passes, and answer.
    pub async fn validate_and_execute(&self, request: ActionRequest) -> ActionResponse {
        let canonical_payload = match self
            .authenticate(&request)
            .and_then(|()| self.canonical_payload(&request))
        {
            Ok(canonical) => canonical,
            Err(rejection) => return self.refuse(&request, rejection, None, None),
        };
        let payload_hash = sha256_hex(canonical_payload.as_bytes());

        let admitted = match self.admit(&request) {
            Ok(admitted) => admitted,
            Err(rejection) => {
                let audit_ref = self.audit_rejection(&request, &payload_hash, &rejection);
                return self.refuse(&request, rejection, audit_ref, Some(&payload_hash));
            }
        };

        let report = self.anomaly.evaluate(
            admitted.target.as_ref().map(|t| t.domain.as_str()),
            canonical_payload.len(),
        );
        if report.flagged {
            self.anomaly_sink.report(&request.id, admitted.action, &report);
        }

        let pending = match self.audit.append(self.new_row(
            &request,
            Some(admitted.action),
            &payload_hash,
            AuditStatus::Pending,
        )) {
            Ok(row) => row,
            Err(e) => {
                error!(
                    component = "pipeline",
                    request_id = %request.id,
                    stage = "audit_pending",
                    error = %e,
                    "Audit write failed; request not dispatched"
                );
                return self.refuse(&request, GatewayError::Internal, None, Some(&payload_hash));
            }
        };
        debug!(
            component = "pipeline",
            request_id = %request.id,
            stage = "audited_pending",
            audit_ref = %pending.id,
            "Dispatching"
        );

        let result = {
            let _timer = gateway_telemetry::time_histogram!(DISPATCH_DURATION);
            self.registry
                .dispatch(admitted.action, &admitted.payload)
                .await
        };

        match result {
            Ok(data) => {
                let mut row = NewAuditEntry::transition(&pending, AuditStatus::Success);
                match sha256_hex_json(&data) {
                    Ok(hash) => row.response_hash = Some(hash),
                    Err(e) => warn!(
                        component = "pipeline",
                        request_id = %request.id,
                        error = %e,
                        "Response could not be hashed"
                    ),
                }
                self.append_final(&pending, row);

                gateway_telemetry::metric_inc!(REQUESTS_TOTAL, &["success"]);
                info!(
                    component = "pipeline",
                    request_id = %request.id,
                    action = %admitted.action,
                    audit_ref = %pending.id,
                    "Action completed"
                );
                ActionResponse::success(request.id, self.now(), data, Some(pending.id))
            }
            Err(handler_error) => {
                let mut row = NewAuditEntry::transition(&pending, AuditStatus::Error);
                row.error_code = Some(handler_error.code.clone());
                self.append_final(&pending, row);

                gateway_telemetry::metric_inc!(REQUESTS_TOTAL, &["error"]);
                warn!(
                    component = "pipeline",
                    request_id = %request.id,
                    action = %admitted.action,
                    code = %handler_error.code,
                    "Handler failed"
                );
                ActionResponse::failure(
                    request.id,
                    self.now(),
                    ActionError::new(handler_error.code, handler_error.message),
                    Some(pending.id),
                )
            }
        }
    }

    /// Signature, freshness and replay. Nothing here touches the audit trail.
    fn authenticate(&self, request: &ActionRequest) -> Result<(), GatewayError> {
        let key = self.keys.get_key().map_err(|e| {
            error!(
                component = "pipeline",
                request_id = %request.id,
                error = %e,
                "Signing key unavailable"
            );
            GatewayError::Internal
        })?;

        if !shared_crypto::verify(
            key.as_bytes(),
            &request.signature,
            &request.id,
            &request.timestamp,
            &request.action,
            &request.payload,
        ) {
            return Err(GatewayError::SignatureInvalid);
        }

        let issued_at = self.replay.check_freshness(&request.timestamp)?;
        self.replay.check_and_record(&request.id, issued_at)?;
        debug!(
            component = "pipeline",
            request_id = %request.id,
            stage = "authenticated",
            "Request authenticated"
        );
        Ok(())
    }

    fn canonical_payload(&self, request: &ActionRequest) -> Result<String, GatewayError> {
        canonical_json(&Value::Object(request.payload.clone())).map_err(|e| {
            error!(
                component = "pipeline",
                request_id = %request.id,
                error = %e,
                "Payload could not be canonicalized"
            );
            GatewayError::Internal
        })
    }

    /// Action name, schema, allow-list and rate limit.
    fn admit(&self, request: &ActionRequest) -> Result<Admitted, GatewayError> {
        let action: ActionType = request
            .action
            .parse()
            .map_err(|UnknownAction(action)| GatewayError::UnknownAction { action })?;

        let payload = action.parse_payload(&request.payload)?;

        let target = payload.network_target(&self.config.search_provider_domain);
        if let Some(target) = &target {
            if !self.allowlist.is_allowed(&target.domain, target.port) {
                return Err(GatewayError::DomainNotAllowed {
                    domain: target.domain.clone(),
                    port: target.port,
                });
            }
        }

        if let RateDecision::Limited { scope, retry_after } = self.rate_limiter.check(action) {
            return Err(GatewayError::RateLimited {
                scope,
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        Ok(Admitted {
            action,
            payload,
            target,
        })
    }

    fn new_row(
        &self,
        request: &ActionRequest,
        action: Option<ActionType>,
        payload_hash: &str,
        status: AuditStatus,
    ) -> NewAuditEntry {
        let tier = self.config.autonomy_tier;
        let approval_required = tier.approval_required(action.is_some_and(|a| a.is_write()));
        NewAuditEntry {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            action: request.action.clone(),
            payload_hash: payload_hash.to_string(),
            status,
            error_code: None,
            autonomy_tier: tier,
            approval_required,
            // Approval is collected in Core before the request is signed.
            approval_given: approval_required,
            estimated_time_saved_seconds: action
                .map(|a| a.estimated_time_saved_seconds())
                .unwrap_or(0),
            response_hash: None,
        }
    }

    /// Record a post-authentication rejection. Returns the `auditRef`, or
    /// `None` when the trail could not be written.
    fn audit_rejection(
        &self,
        request: &ActionRequest,
        payload_hash: &str,
        rejection: &GatewayError,
    ) -> Option<String> {
        let action = request.action.parse::<ActionType>().ok();
        let mut row = self.new_row(request, action, payload_hash, AuditStatus::Rejected);
        row.error_code = Some(rejection.code().as_str().to_string());

        match self.audit.append(row) {
            Ok(row) => Some(row.id),
            Err(e) => {
                error!(
                    component = "pipeline",
                    request_id = %request.id,
                    error = %e,
                    "Rejection could not be audited"
                );
                None
            }
        }
    }

    /// The handler already ran, so a failed final row is logged and the
    /// handler's result is still returned. The record stays `pending` until
    /// the next start reconciles it.
    fn append_final(&self, pending: &AuditEntry, row: NewAuditEntry) {
        if let Err(e) = self.audit.append(row) {
            error!(
                component = "pipeline",
                request_id = %pending.request_id,
                audit_ref = %pending.id,
                error = %e,
                "Final audit row could not be written"
            );
        }
    }

    fn refuse(
        &self,
        request: &ActionRequest,
        rejection: GatewayError,
        audit_ref: Option<String>,
        payload_hash: Option<&str>,
    ) -> ActionResponse {
        let code = rejection.code();
        gateway_telemetry::metric_inc!(REQUESTS_TOTAL, &["rejected"]);
        gateway_telemetry::metric_inc!(REJECTIONS_TOTAL, &[code.as_str()]);

        match &rejection {
            GatewayError::DomainNotAllowed { domain, port } => {
                gateway_telemetry::log_rejection!(
                    "pipeline",
                    request.id,
                    code,
                    "Request rejected",
                    action = %request.action,
                    domain = %domain,
                    port = ?port
                );
            }
            // The schema message can quote payload values, so only its
            // category and field name are logged.
            GatewayError::SchemaInvalid(schema) => {
                gateway_telemetry::log_rejection!(
                    "pipeline",
                    request.id,
                    code,
                    "Request rejected",
                    action = %request.action,
                    violation = schema.violation().as_str(),
                    field = schema.field().unwrap_or("-"),
                    payload_hash = payload_hash.unwrap_or("-")
                );
            }
            _ => {
                gateway_telemetry::log_rejection!(
                    "pipeline",
                    request.id,
                    code,
                    "Request rejected",
                    action = %request.action,
                    reason = %rejection
                );
            }
        }

        ActionResponse::failure(
            request.id.clone(),
            self.now(),
            ActionError::from_code(code, rejection.to_string()),
            audit_ref,
        )
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn pins(&self) -> &CertificatePinRegistry {
        &self.pins
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    /// The shared key, for handing to an embedded Core.
    pub fn signing_key(&self) -> Result<SigningKey, KeyError> {
        self.keys.get_key()
    }

    /// Clear replay, rate and anomaly state.
    #[cfg(any(test, feature = "test-support"))]
    pub fn reset_volatile_state(&self) {
        self.replay.reset();
        self.rate_limiter.reset();
        self.anomaly.reset();
    }
}

#[async_trait]
impl RequestHandler for Gateway {
    async fn handle(&self, request: ActionRequest) -> ActionResponse {
        self.validate_and_execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::anomaly_sink::RecordingAnomalySink;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::registry::HandlerRegistry;
    use crate::adapters::storage::InMemoryKVStore;
    use crate::domain::allowlist::NewService;
    use crate::domain::anomaly::AnomalyKind;
    use crate::ports::outbound::{ActionHandler, HandlerError};
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use shared_types::errors::{GATEWAY_INTERRUPTED, HANDLER_NOT_CONFIGURED};
    use shared_types::{AutonomyTier, ErrorCode, Payload, Protocol, RequestSource};
    use std::time::Duration;

    struct StaticHandler(Result<Value, HandlerError>);

    #[async_trait]
    impl ActionHandler for StaticHandler {
        async fn execute(&self, _payload: &ActionPayload) -> Result<Value, HandlerError> {
            self.0.clone()
        }
    }

    struct Fixture {
        gateway: Gateway,
        clock: Arc<ManualClock>,
        store: Arc<InMemoryKVStore>,
        sink: Arc<RecordingAnomalySink>,
        key: SigningKey,
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn default_registry() -> HandlerRegistry {
        HandlerRegistry::new()
            .with_handler(
                ActionType::WebFetch,
                Arc::new(StaticHandler(Ok(json!({ "status": 200, "body": "ok" })))),
            )
            .with_handler(
                ActionType::EmailFetch,
                Arc::new(StaticHandler(Ok(json!({ "messages": [] })))),
            )
            .with_handler(
                ActionType::EmailSend,
                Arc::new(StaticHandler(Err(HandlerError::new(
                    "SMTP_ERROR",
                    "relay refused",
                )))),
            )
    }

    fn open(
        config: GatewayConfig,
        store: Arc<InMemoryKVStore>,
        registry: HandlerRegistry,
    ) -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let sink = Arc::new(RecordingAnomalySink::new());
        let gateway = Gateway::new(
            config,
            store.clone(),
            clock.clone(),
            Arc::new(registry),
            sink.clone(),
        )
        .unwrap();
        let key = gateway.signing_key().unwrap();
        Fixture {
            gateway,
            clock,
            store,
            sink,
            key,
        }
    }

    fn fixture() -> Fixture {
        let fx = open(
            GatewayConfig::default(),
            Arc::new(InMemoryKVStore::new()),
            default_registry(),
        );
        allow(&fx, "example.com");
        fx
    }

    fn allow(fx: &Fixture, domain: &str) {
        fx.gateway
            .allowlist()
            .add_service(NewService {
                service_name: domain.to_string(),
                domain: domain.to_string(),
                port: None,
                protocol: Protocol::Https,
                added_by: "test".to_string(),
            })
            .unwrap();
    }

    fn payload(value: Value) -> Payload {
        serde_json::from_value(value).unwrap()
    }

    fn signed_at(
        fx: &Fixture,
        id: &str,
        at: DateTime<Utc>,
        action: &str,
        body: Value,
    ) -> ActionRequest {
        let timestamp = format_timestamp(at);
        let payload = payload(body);
        let signature =
            shared_crypto::sign(fx.key.as_bytes(), id, &timestamp, action, &payload).unwrap();
        ActionRequest {
            id: id.to_string(),
            timestamp,
            action: action.to_string(),
            payload,
            source: RequestSource::Core,
            signature,
        }
    }

    fn signed(fx: &Fixture, id: &str, action: &str, body: Value) -> ActionRequest {
        signed_at(fx, id, fx.clock.now(), action, body)
    }

    fn calendar_fetch_body() -> Value {
        json!({ "accountId": "acct-1", "startDate": "2026-01-01", "endDate": "2026-01-02" })
    }

    fn fetch(fx: &Fixture, id: &str) -> ActionRequest {
        signed(fx, id, "web.fetch", json!({ "url": "https://example.com/page" }))
    }

    #[tokio::test]
    async fn test_allowed_request_succeeds_and_is_audited() {
        let fx = fixture();
        let response = fx.gateway.validate_and_execute(fetch(&fx, "req-1")).await;

        assert!(response.is_success(), "{response:?}");
        assert_eq!(response.request_id, "req-1");
        let audit_ref = response.audit_ref.clone().unwrap();

        let record = fx.gateway.audit().record(&audit_ref).unwrap().unwrap();
        assert_eq!(
            record.transitions,
            vec![AuditStatus::Pending, AuditStatus::Success]
        );
        let last = record.rows.last().unwrap();
        assert_eq!(
            last.response_hash.as_deref(),
            Some(
                sha256_hex_json(&json!({ "status": 200, "body": "ok" }))
                    .unwrap()
                    .as_str()
            )
        );
        assert_eq!(last.estimated_time_saved_seconds, 30);
        assert_eq!(fx.gateway.audit().record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replayed_request_rejected() {
        let fx = fixture();
        let request = fetch(&fx, "req-1");
        assert!(fx.gateway.validate_and_execute(request.clone()).await.is_success());

        let second = fx.gateway.validate_and_execute(request).await;
        assert_eq!(second.error_code(), Some("REQUEST_REPLAYED"));
        assert!(second.audit_ref.is_none());
        assert_eq!(fx.gateway.audit().record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tampered_request_not_audited() {
        let fx = fixture();
        let mut request = fetch(&fx, "req-1");
        request
            .payload
            .insert("url".to_string(), json!("https://evil.example.net"));

        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("SIGNATURE_INVALID"));
        assert!(response.audit_ref.is_none());
        assert!(fx.gateway.audit().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_forged_signature_does_not_burn_id() {
        let fx = fixture();
        let mut forged = fetch(&fx, "req-1");
        forged.signature = "00".repeat(32);
        let response = fx.gateway.validate_and_execute(forged).await;
        assert!(response.error.as_ref().unwrap().is(ErrorCode::SignatureInvalid));

        let genuine = fetch(&fx, "req-1");
        assert!(fx.gateway.validate_and_execute(genuine).await.is_success());
    }

    #[tokio::test]
    async fn test_freshness_window() {
        let fx = fixture();
        let now = fx.clock.now();
        let body = json!({ "url": "https://example.com" });

        let ok = signed_at(
            &fx,
            "r29",
            now - chrono::Duration::seconds(29),
            "web.fetch",
            body.clone(),
        );
        assert!(fx.gateway.validate_and_execute(ok).await.is_success());

        for (id, at) in [
            ("r31-past", now - chrono::Duration::seconds(31)),
            ("r31-future", now + chrono::Duration::seconds(31)),
        ] {
            let stale = signed_at(&fx, id, at, "web.fetch", body.clone());
            let response = fx.gateway.validate_and_execute(stale).await;
            assert_eq!(response.error_code(), Some("TIMESTAMP_STALE"), "{id}");
        }
    }

    #[tokio::test]
    async fn test_unknown_action_is_audited() {
        let fx = fixture();
        let response = fx
            .gateway
            .validate_and_execute(signed(&fx, "req-1", "shell.exec", json!({})))
            .await;
        assert_eq!(response.error_code(), Some("UNKNOWN_ACTION"));

        let record = fx
            .gateway
            .audit()
            .record(&response.audit_ref.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AuditStatus::Rejected);
        assert_eq!(
            record.rows[0].error_code.as_deref(),
            Some("UNKNOWN_ACTION")
        );
    }

    #[tokio::test]
    async fn test_schema_rejects_unknown_fields() {
        let fx = fixture();
        let request = signed(
            &fx,
            "req-1",
            "web.fetch",
            json!({ "url": "https://example.com", "followRedirects": true }),
        );
        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("SCHEMA_INVALID"));
        assert!(response.audit_ref.is_some());
    }

    /// Log output captured for inspection.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_schema_rejection_log_omits_payload_values() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = fixture();
        let body = json!({ "accountId": "acct-1", "limit": "hunter2-secret" });
        let expected_hash = sha256_hex(canonical_json(&body).unwrap().as_bytes());
        let request = signed(&fx, "req-1", "email.fetch", body);
        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("SCHEMA_INVALID"));

        let text = log.text();
        assert!(text.contains("Request rejected"), "{text}");
        assert!(text.contains("invalid_value"), "{text}");
        assert!(text.contains(&expected_hash), "{text}");
        assert!(!text.contains("hunter2-secret"), "{text}");
    }

    #[tokio::test]
    async fn test_default_deny_then_allow() {
        let fx = fixture();
        let request = signed(&fx, "req-1", "web.fetch", json!({ "url": "https://other.org/" }));
        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("DOMAIN_NOT_ALLOWED"));

        allow(&fx, "other.org");
        let request = signed(&fx, "req-2", "web.fetch", json!({ "url": "https://other.org/" }));
        assert!(fx.gateway.validate_and_execute(request).await.is_success());
    }

    #[tokio::test]
    async fn test_search_checks_provider_domain() {
        let mut fx = fixture();
        fx.gateway.registry = Arc::new(default_registry().with_handler(
            ActionType::WebSearch,
            Arc::new(StaticHandler(Ok(json!({ "results": [] })))),
        ));
        let search = |id: &str| signed(&fx, id, "web.search", json!({ "query": "rust" }));

        let response = fx.gateway.validate_and_execute(search("req-1")).await;
        assert_eq!(response.error_code(), Some("DOMAIN_NOT_ALLOWED"));

        allow(&fx, "api.search.brave.com");
        assert!(fx.gateway.validate_and_execute(search("req-2")).await.is_success());
    }

    #[tokio::test]
    async fn test_account_actions_skip_allowlist() {
        let fx = fixture();
        let body = json!({ "accountId": "acct-1", "folder": "INBOX" });
        let request = signed(&fx, "req-1", "email.fetch", body);
        let response = fx.gateway.validate_and_execute(request).await;
        assert!(response.is_success(), "{response:?}");
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = GatewayConfig::default();
        config.rate_limits.action_limits.insert(ActionType::WebFetch, 2);
        let fx = open(config, Arc::new(InMemoryKVStore::new()), default_registry());
        allow(&fx, "example.com");

        for id in ["r1", "r2"] {
            assert!(fx.gateway.validate_and_execute(fetch(&fx, id)).await.is_success());
        }
        let limited = fx.gateway.validate_and_execute(fetch(&fx, "r3")).await;
        assert_eq!(limited.error_code(), Some("RATE_LIMITED"));

        fx.clock.advance(Duration::from_secs(61));
        assert!(fx.gateway.validate_and_execute(fetch(&fx, "r4")).await.is_success());
    }

    #[tokio::test]
    async fn test_handler_error_passed_through_and_audited() {
        let fx = fixture();
        let request = signed(
            &fx,
            "req-1",
            "email.send",
            json!({
                "accountId": "acct-1",
                "to": ["a@example.com"],
                "subject": "hi",
                "body": "hello"
            }),
        );
        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("SMTP_ERROR"));

        let record = fx
            .gateway
            .audit()
            .record(&response.audit_ref.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            record.transitions,
            vec![AuditStatus::Pending, AuditStatus::Error]
        );
        assert_eq!(record.rows[1].error_code.as_deref(), Some("SMTP_ERROR"));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let fx = fixture();
        let request = signed(&fx, "req-1", "calendar.fetch", calendar_fetch_body());
        let response = fx.gateway.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some(HANDLER_NOT_CONFIGURED));
        assert!(response.audit_ref.is_some());
    }

    #[tokio::test]
    async fn test_new_domain_is_flagged_not_blocked() {
        let fx = fixture();
        let response = fx.gateway.validate_and_execute(fetch(&fx, "req-1")).await;
        assert!(response.is_success());

        let reports = fx.sink.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].2.has(AnomalyKind::NewDomain));

        fx.gateway.validate_and_execute(fetch(&fx, "req-2")).await;
        assert_eq!(fx.sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_allowlisted_domains_seeded_at_startup() {
        let store = Arc::new(InMemoryKVStore::new());
        let first = open(GatewayConfig::default(), store.clone(), default_registry());
        allow(&first, "example.com");
        drop(first);

        let fx = open(GatewayConfig::default(), store, default_registry());
        assert!(fx.gateway.validate_and_execute(fetch(&fx, "req-1")).await.is_success());
        assert!(fx.sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_trailing_dot_host_is_not_a_new_domain() {
        let store = Arc::new(InMemoryKVStore::new());
        let first = open(GatewayConfig::default(), store.clone(), default_registry());
        allow(&first, "example.com");
        drop(first);

        let fx = open(GatewayConfig::default(), store, default_registry());
        let request = signed(&fx, "req-1", "web.fetch", json!({ "url": "https://example.com./" }));
        assert!(fx.gateway.validate_and_execute(request).await.is_success());
        assert!(fx.sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_startup_reconciles_pending_records() {
        let store = Arc::new(InMemoryKVStore::new());
        {
            let trail =
                AuditTrail::open(store.clone(), Arc::new(ManualClock::new(start()))).unwrap();
            trail
                .append(NewAuditEntry {
                    id: "crashed".to_string(),
                    request_id: "req-0".to_string(),
                    action: "web.fetch".to_string(),
                    payload_hash: sha256_hex_json(&json!({})).unwrap(),
                    status: AuditStatus::Pending,
                    error_code: None,
                    autonomy_tier: AutonomyTier::Partner,
                    approval_required: false,
                    approval_given: false,
                    estimated_time_saved_seconds: 30,
                    response_hash: None,
                })
                .unwrap();
        }

        let fx = open(GatewayConfig::default(), store, default_registry());
        let record = fx.gateway.audit().record("crashed").unwrap().unwrap();
        assert_eq!(record.status, AuditStatus::Error);
        assert_eq!(
            record.rows[1].error_code.as_deref(),
            Some(GATEWAY_INTERRUPTED)
        );
        assert!(fx.gateway.audit().verify_chain().unwrap().is_intact());
    }

    #[tokio::test]
    async fn test_approval_metadata_follows_tier() {
        let config = GatewayConfig {
            autonomy_tier: AutonomyTier::Guardian,
            ..GatewayConfig::default()
        };
        let fx = open(config, Arc::new(InMemoryKVStore::new()), default_registry());
        allow(&fx, "example.com");

        let response = fx.gateway.validate_and_execute(fetch(&fx, "req-1")).await;
        let record = fx
            .gateway
            .audit()
            .record(&response.audit_ref.unwrap())
            .unwrap()
            .unwrap();
        assert!(record.rows.iter().all(|r| r.approval_required && r.approval_given));
        assert!(record
            .rows
            .iter()
            .all(|r| r.autonomy_tier == AutonomyTier::Guardian));
    }

    #[tokio::test]
    async fn test_chain_intact_after_mixed_traffic() {
        let fx = fixture();
        fx.gateway.validate_and_execute(fetch(&fx, "r1")).await;
        fx.gateway
            .validate_and_execute(signed(&fx, "r2", "shell.exec", json!({})))
            .await;
        fx.gateway
            .validate_and_execute(signed(
                &fx,
                "r3",
                "web.fetch",
                json!({ "url": "https://nope.io" }),
            ))
            .await;
        fx.gateway
            .validate_and_execute(signed(&fx, "r4", "calendar.fetch", calendar_fetch_body()))
            .await;

        let verification = fx.gateway.audit().verify_chain().unwrap();
        assert!(verification.is_intact());
        assert_eq!(verification.rows_checked, 6);
    }

    #[tokio::test]
    async fn test_corrupt_key_yields_internal_error() {
        let store = Arc::new(InMemoryKVStore::new());
        let fx = open(GatewayConfig::default(), store.clone(), default_registry());
        let request = fetch(&fx, "req-1");

        store.put(b"signing_key/core-gateway", b"garbage").unwrap();
        let fresh = Gateway::new(
            GatewayConfig::default(),
            store,
            fx.clock.clone(),
            Arc::new(default_registry()),
            Arc::new(RecordingAnomalySink::new()),
        )
        .unwrap();
        let response = fresh.validate_and_execute(request).await;
        assert_eq!(response.error_code(), Some("INTERNAL_ERROR"));
        assert_eq!(
            response.error.unwrap().message,
            "internal gateway error"
        );
    }

    #[tokio::test]
    async fn test_reset_volatile_state_allows_resend() {
        let fx = fixture();
        let request = fetch(&fx, "req-1");
        assert!(fx.gateway.validate_and_execute(request.clone()).await.is_success());
        fx.gateway.reset_volatile_state();
        assert!(fx.gateway.validate_and_execute(request).await.is_success());
    }
}
