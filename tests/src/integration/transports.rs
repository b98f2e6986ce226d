//! The in-process and Unix-socket transports must be indistinguishable to
//! Core: same checks, same codes, same audit rows.

use super::fixture::{fetch_payload, Harness};
use semblance_gateway::adapters::InMemoryKVStore;
use semblance_gateway::ipc::{CoreClient, IpcTransport, UnixSocketServer, UnixSocketTransport};
use shared_types::{ActionResponse, ActionType, AuditStatus};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Run a fixed scenario and reduce each response to what Core can act on.
async fn scenario(client: &CoreClient) -> Vec<(bool, Option<String>, bool)> {
    let summarize = |r: ActionResponse| {
        (
            r.is_success(),
            r.error_code().map(str::to_string),
            r.audit_ref.is_some(),
        )
    };

    let mut outcomes = Vec::new();
    let ok = client
        .request(ActionType::WebFetch, fetch_payload("https://example.com/"))
        .await
        .unwrap();
    outcomes.push(summarize(ok));

    let denied = client
        .request(ActionType::WebFetch, fetch_payload("https://blocked.example.org/"))
        .await
        .unwrap();
    outcomes.push(summarize(denied));

    let request = client
        .build_request("web.fetch", fetch_payload("https://example.com/again"))
        .unwrap();
    client.send(request.clone()).await.unwrap();
    let replayed = client.send(request).await.unwrap();
    outcomes.push(summarize(replayed));

    outcomes
}

fn audit_statuses(harness: &Harness) -> Vec<AuditStatus> {
    harness
        .gateway
        .audit()
        .entries()
        .unwrap()
        .into_iter()
        .map(|row| row.status)
        .collect()
}

#[tokio::test]
async fn test_transport_parity() {
    let in_process = Harness::start(Arc::new(InMemoryKVStore::new()));
    in_process.allow("example.com");
    let client = in_process.in_process_client();
    client.transport().start().await.unwrap();
    let expected = scenario(&client).await;

    let over_socket = Harness::start(Arc::new(InMemoryKVStore::new()));
    over_socket.allow("example.com");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.sock");
    let server = UnixSocketServer::bind(&path, over_socket.gateway.clone()).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async move {
        let _ = stopped.await;
    }));

    let transport = Arc::new(UnixSocketTransport::new(&path));
    transport.start().await.unwrap();
    let client = CoreClient::new(transport.clone(), over_socket.gateway.signing_key().unwrap());
    let actual = scenario(&client).await;

    assert_eq!(actual, expected);
    assert_eq!(audit_statuses(&over_socket), audit_statuses(&in_process));
    assert_eq!(over_socket.fetch.calls(), in_process.fetch.calls());

    transport.stop().await.unwrap();
    stop.send(()).unwrap();
    serving.await.unwrap().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_socket_serves_concurrent_clients() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    harness.allow("example.com");
    let key = harness.gateway.signing_key().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.sock");
    let server = UnixSocketServer::bind(&path, harness.gateway.clone()).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_until(async move {
        let _ = stopped.await;
    }));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let transport = Arc::new(UnixSocketTransport::new(&path));
        let client = CoreClient::new(transport, key.clone());
        tasks.push(tokio::spawn(async move {
            client.transport().start().await.unwrap();
            let url = format!("https://example.com/{i}");
            client
                .request(ActionType::WebFetch, fetch_payload(&url))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_success());
    }

    assert_eq!(harness.fetch.calls(), 4);
    assert_eq!(harness.gateway.audit().record_count().unwrap(), 4);
    assert!(harness.gateway.audit().verify_chain().unwrap().is_intact());

    stop.send(()).unwrap();
    serving.await.unwrap().unwrap();
}
