//! Request lifecycle through the full pipeline, seen from Core.

use super::fixture::{fetch_payload, payload, send_payload, Harness};
use semblance_gateway::adapters::InMemoryKVStore;
use semblance_gateway::ipc::IpcTransport;
use serde_json::json;
use shared_types::{ActionType, AuditStatus, ErrorCode, ResponseStatus};
use std::sync::Arc;

#[tokio::test]
async fn test_success_is_audited_pending_then_success() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    harness.allow("example.com");
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();

    let response = client
        .request(ActionType::WebFetch, fetch_payload("https://example.com/"))
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.data.as_ref().unwrap()["status"], 200);
    assert_eq!(harness.fetch.calls(), 1);

    let audit_ref = response.audit_ref.expect("audit ref");
    let record = harness.gateway.audit().record(&audit_ref).unwrap().unwrap();
    assert_eq!(record.request_id, response.request_id);
    assert_eq!(
        record.transitions,
        vec![AuditStatus::Pending, AuditStatus::Success]
    );
    assert!(record.rows[1].response_hash.is_some());
}

#[tokio::test]
async fn test_resent_request_is_replayed_and_dispatched_once() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    harness.allow("example.com");
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();

    let request = client
        .build_request("web.fetch", fetch_payload("https://example.com/"))
        .unwrap();
    let first = client.send(request.clone()).await.unwrap();
    let second = client.send(request).await.unwrap();

    assert!(first.is_success());
    assert_eq!(second.error_code(), Some(ErrorCode::RequestReplayed.as_str()));
    assert!(second.audit_ref.is_none());
    assert_eq!(harness.fetch.calls(), 1);
    assert_eq!(harness.gateway.audit().record_count().unwrap(), 1);
}

#[tokio::test]
async fn test_request_signed_with_another_key_is_refused_unaudited() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    harness.allow("example.com");
    let impostor = semblance_gateway::ipc::CoreClient::new(
        Arc::new(semblance_gateway::ipc::InProcessTransport::new(
            harness.gateway.clone(),
        )),
        shared_crypto::SigningKey::generate(),
    );
    impostor.transport().start().await.unwrap();

    let response = impostor
        .request(ActionType::WebFetch, fetch_payload("https://example.com/"))
        .await
        .unwrap();

    assert_eq!(response.error_code(), Some(ErrorCode::SignatureInvalid.as_str()));
    assert_eq!(harness.fetch.calls(), 0);
    assert!(harness.gateway.audit().is_empty().unwrap());
}

#[tokio::test]
async fn test_unlisted_domain_is_rejected_and_audited() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();

    let response = client
        .request(ActionType::WebFetch, fetch_payload("https://tracker.example.net/"))
        .await
        .unwrap();

    assert_eq!(response.error_code(), Some(ErrorCode::DomainNotAllowed.as_str()));
    assert_eq!(harness.fetch.calls(), 0);
    let rows = harness
        .gateway
        .audit()
        .by_request_id(&response.request_id)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AuditStatus::Rejected);
    assert_eq!(rows[0].error_code.as_deref(), Some("DOMAIN_NOT_ALLOWED"));
    assert_eq!(response.audit_ref.as_deref(), Some(rows[0].id.as_str()));
}

#[tokio::test]
async fn test_handler_failure_reaches_core_with_its_code() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();

    let response = client
        .request(ActionType::EmailSend, send_payload())
        .await
        .unwrap();

    assert_eq!(response.error_code(), Some("SMTP_ERROR"));
    assert_eq!(harness.send.calls(), 1);
    let record = harness
        .gateway
        .audit()
        .record(response.audit_ref.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AuditStatus::Error);
    assert!(record.rows[0].approval_required);
}

#[tokio::test]
async fn test_unknown_action_and_bad_schema() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    harness.allow("example.com");
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();

    let unknown = client
        .build_request("shell.exec", payload(json!({ "cmd": "ls" })))
        .unwrap();
    let response = client.send(unknown).await.unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::UnknownAction.as_str()));

    let response = client
        .request(
            ActionType::WebFetch,
            payload(json!({ "url": "https://example.com/", "followRedirects": true })),
        )
        .await
        .unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::SchemaInvalid.as_str()));

    assert_eq!(harness.fetch.calls(), 0);
    assert!(harness.gateway.audit().verify_chain().unwrap().is_intact());
}

#[tokio::test]
async fn test_first_contact_with_domain_is_reported() {
    let harness = Harness::start(Arc::new(InMemoryKVStore::new()));
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();
    harness.allow("example.com");

    let first = client
        .request(ActionType::WebFetch, fetch_payload("https://example.com/a"))
        .await
        .unwrap();
    assert!(first.is_success());

    // Domains allow-listed after startup are new on first contact only.
    let second = client
        .request(ActionType::WebFetch, fetch_payload("https://example.com/b"))
        .await
        .unwrap();
    assert!(second.is_success());

    let reports = harness.sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, first.request_id);
}
