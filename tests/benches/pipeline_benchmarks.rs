//! # Gateway Pipeline Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | HMAC sign + verify of a typical request | < 50µs |
//! | Canonical JSON of a nested payload | < 20µs |
//! | Full `validate_and_execute` (in-memory store) | < 1ms |
//! | Audit chain verification, 1000 rows | < 50ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semblance_gateway::adapters::{HandlerRegistry, InMemoryKVStore, SystemClock};
use semblance_gateway::domain::allowlist::NewService;
use semblance_gateway::ipc::{CoreClient, InProcessTransport, IpcTransport};
use semblance_gateway::{ActionHandler, Gateway, GatewayConfig, HandlerError};
use serde_json::{json, Value};
use shared_crypto::SigningKey;
use shared_types::{ActionPayload, ActionType, Payload, Protocol};
use std::sync::Arc;
use std::time::Duration;

struct Noop;

#[async_trait::async_trait]
impl ActionHandler for Noop {
    async fn execute(&self, _payload: &ActionPayload) -> Result<Value, HandlerError> {
        Ok(json!({ "status": 200 }))
    }
}

fn payload() -> Payload {
    serde_json::from_value(json!({
        "accountId": "acct-1",
        "to": ["a@example.com", "b@example.com"],
        "subject": "quarterly numbers",
        "body": "x".repeat(2048),
        "cc": ["c@example.com"]
    }))
    .unwrap()
}

fn unlimited() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.rate_limits.global_limit = u32::MAX;
    config.rate_limits.default_action_limit = u32::MAX;
    config.rate_limits.action_limits.clear();
    config
}

fn gateway() -> Arc<Gateway> {
    let registry = HandlerRegistry::new().with_handler(ActionType::WebFetch, Arc::new(Noop));
    let gateway = Gateway::new(
        unlimited(),
        Arc::new(InMemoryKVStore::new()),
        Arc::new(SystemClock),
        Arc::new(registry),
        Arc::new(semblance_gateway::adapters::TracingAnomalySink),
    )
    .unwrap();
    gateway
        .allowlist()
        .add_service(NewService {
            service_name: "example".to_string(),
            domain: "example.com".to_string(),
            port: None,
            protocol: Protocol::Https,
            added_by: "bench".to_string(),
        })
        .unwrap();
    Arc::new(gateway)
}

fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("signing");
    let key = SigningKey::generate();
    let payload = payload();
    let ts = "2026-01-01T00:00:00.000Z";

    group.bench_function("sign", |b| {
        b.iter(|| {
            shared_crypto::sign(key.as_bytes(), "req-1", ts, "email.send", black_box(&payload))
                .unwrap()
        })
    });

    let signature =
        shared_crypto::sign(key.as_bytes(), "req-1", ts, "email.send", &payload).unwrap();
    group.bench_function("verify", |b| {
        b.iter(|| {
            shared_crypto::verify(
                key.as_bytes(),
                black_box(&signature),
                "req-1",
                ts,
                "email.send",
                &payload,
            )
        })
    });

    let value = Value::Object(payload);
    group.bench_function("canonical_json", |b| {
        b.iter(|| shared_crypto::canonical_json(black_box(&value)))
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let gateway = gateway();
    let transport = Arc::new(InProcessTransport::new(gateway.clone()));
    runtime.block_on(transport.start()).unwrap();
    let client = CoreClient::new(transport, gateway.signing_key().unwrap());
    let fetch: Payload = serde_json::from_value(json!({ "url": "https://example.com/" })).unwrap();

    let mut group = c.benchmark_group("pipeline");
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(1));
    group.bench_function("validate_and_execute", |b| {
        b.iter(|| {
            let response = runtime
                .block_on(client.request(ActionType::WebFetch, fetch.clone()))
                .unwrap();
            black_box(response)
        })
    });
    group.finish();
}

fn bench_chain_verification(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("audit");

    for requests in [100usize, 500] {
        let gateway = gateway();
        let transport = Arc::new(InProcessTransport::new(gateway.clone()));
        runtime.block_on(transport.start()).unwrap();
        let client = CoreClient::new(transport, gateway.signing_key().unwrap());
        let fetch: Payload =
            serde_json::from_value(json!({ "url": "https://example.com/" })).unwrap();
        for _ in 0..requests {
            runtime
                .block_on(client.request(ActionType::WebFetch, fetch.clone()))
                .unwrap();
        }

        let rows = requests * 2;
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("verify_chain", rows), &gateway, |b, g| {
            b.iter(|| black_box(g.audit().verify_chain().unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signing, bench_pipeline, bench_chain_verification);
criterion_main!(benches);
