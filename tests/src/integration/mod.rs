//! # Integration Flows
//!
//! Each test wires a `CoreClient` to a real `Gateway` through one of the
//! transports and checks what Core observes together with what the Gateway
//! persisted.

#[cfg(test)]
mod persistence;
#[cfg(test)]
mod pipeline;
#[cfg(test)]
mod transports;

#[cfg(test)]
pub(crate) mod fixture {
    use async_trait::async_trait;
    use semblance_gateway::adapters::{HandlerRegistry, RecordingAnomalySink, SystemClock};
    use semblance_gateway::domain::allowlist::NewService;
    use semblance_gateway::ipc::{CoreClient, InProcessTransport};
    use semblance_gateway::{ActionHandler, Gateway, GatewayConfig, HandlerError, KeyValueStore};
    use serde_json::{json, Value};
    use shared_types::{ActionPayload, ActionType, Payload, Protocol};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Handler that answers with a fixed body and counts its calls.
    pub struct CountingHandler {
        body: Result<Value, HandlerError>,
        calls: AtomicUsize,
    }

    impl CountingHandler {
        pub fn ok(body: Value) -> Arc<Self> {
            Arc::new(Self {
                body: Ok(body),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(code: &str) -> Arc<Self> {
            Arc::new(Self {
                body: Err(HandlerError::new(code, "upstream refused")),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionHandler for CountingHandler {
        async fn execute(&self, _payload: &ActionPayload) -> Result<Value, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body.clone()
        }
    }

    pub struct Harness {
        pub gateway: Arc<Gateway>,
        pub fetch: Arc<CountingHandler>,
        pub send: Arc<CountingHandler>,
        pub sink: Arc<RecordingAnomalySink>,
    }

    impl Harness {
        /// Gateway over `store` with `web.fetch` succeeding and `email.send`
        /// failing with `SMTP_ERROR`.
        pub fn start(store: Arc<dyn KeyValueStore>) -> Self {
            Self::with_config(store, GatewayConfig::default())
        }

        pub fn with_config(store: Arc<dyn KeyValueStore>, config: GatewayConfig) -> Self {
            let fetch = CountingHandler::ok(json!({ "status": 200, "body": "<html></html>" }));
            let send = CountingHandler::failing("SMTP_ERROR");
            let registry = HandlerRegistry::new()
                .with_handler(ActionType::WebFetch, fetch.clone())
                .with_handler(ActionType::EmailSend, send.clone());
            let sink = Arc::new(RecordingAnomalySink::new());
            let gateway = Gateway::new(
                config,
                store,
                Arc::new(SystemClock),
                Arc::new(registry),
                sink.clone(),
            )
            .unwrap();
            Self {
                gateway: Arc::new(gateway),
                fetch,
                send,
                sink,
            }
        }

        pub fn allow(&self, domain: &str) {
            self.gateway
                .allowlist()
                .add_service(NewService {
                    service_name: domain.to_string(),
                    domain: domain.to_string(),
                    port: None,
                    protocol: Protocol::Https,
                    added_by: "integration".to_string(),
                })
                .unwrap();
        }

        pub fn in_process_client(&self) -> CoreClient {
            let transport = Arc::new(InProcessTransport::new(self.gateway.clone()));
            CoreClient::new(transport, self.gateway.signing_key().unwrap())
        }
    }

    pub fn payload(value: Value) -> Payload {
        serde_json::from_value(value).unwrap()
    }

    pub fn fetch_payload(url: &str) -> Payload {
        payload(json!({ "url": url }))
    }

    pub fn send_payload() -> Payload {
        payload(json!({
            "accountId": "acct-1",
            "to": ["friend@example.com"],
            "subject": "hello",
            "body": "see you soon"
        }))
    }
}
