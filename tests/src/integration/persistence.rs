//! What survives a restart, and what a restart repairs.

use super::fixture::{fetch_payload, Harness};
use semblance_gateway::adapters::FileBackedKVStore;
use semblance_gateway::domain::audit_trail::NewAuditEntry;
use semblance_gateway::ipc::IpcTransport;
use semblance_gateway::KeyValueStore;
use shared_types::errors::GATEWAY_INTERRUPTED;
use shared_types::{ActionType, AuditEntry, AuditStatus, AutonomyTier};
use std::path::Path;
use std::sync::Arc;

fn open(dir: &Path) -> Arc<FileBackedKVStore> {
    Arc::new(FileBackedKVStore::open(dir).unwrap())
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (key, audit_ref) = {
        let harness = Harness::start(open(dir.path()));
        harness.allow("example.com");
        harness
            .gateway
            .pins()
            .register_pin("example.com", &[], true, "first use")
            .unwrap();
        let client = harness.in_process_client();
        client.transport().start().await.unwrap();
        let response = client
            .request(ActionType::WebFetch, fetch_payload("https://example.com/"))
            .await
            .unwrap();
        assert!(response.is_success());
        (harness.gateway.signing_key().unwrap(), response.audit_ref.unwrap())
    };

    let harness = Harness::start(open(dir.path()));
    assert_eq!(harness.gateway.signing_key().unwrap(), key);
    assert!(harness.gateway.allowlist().is_allowed("example.com", None));
    assert!(harness.gateway.pins().get("example.com").unwrap().enforced);

    let record = harness.gateway.audit().record(&audit_ref).unwrap().unwrap();
    assert_eq!(record.status, AuditStatus::Success);

    // The chain continues from the persisted tail.
    let client = harness.in_process_client();
    client.transport().start().await.unwrap();
    let response = client
        .request(ActionType::WebFetch, fetch_payload("https://example.com/next"))
        .await
        .unwrap();
    assert!(response.is_success());
    let verification = harness.gateway.audit().verify_chain().unwrap();
    assert!(verification.is_intact());
    assert_eq!(verification.rows_checked, 4);
}

#[tokio::test]
async fn test_restart_closes_interrupted_dispatch() {
    let dir = tempfile::tempdir().unwrap();

    let pending = {
        let harness = Harness::start(open(dir.path()));
        harness
            .gateway
            .audit()
            .append(NewAuditEntry {
                id: "rec-crashed".to_string(),
                request_id: "req-crashed".to_string(),
                action: "web.fetch".to_string(),
                payload_hash: "00".repeat(32),
                status: AuditStatus::Pending,
                error_code: None,
                autonomy_tier: AutonomyTier::Partner,
                approval_required: false,
                approval_given: false,
                estimated_time_saved_seconds: 5,
                response_hash: None,
            })
            .unwrap()
    };

    let harness = Harness::start(open(dir.path()));
    let record = harness.gateway.audit().record(&pending.id).unwrap().unwrap();
    assert_eq!(
        record.transitions,
        vec![AuditStatus::Pending, AuditStatus::Error]
    );
    assert_eq!(
        record.rows[1].error_code.as_deref(),
        Some(GATEWAY_INTERRUPTED)
    );
    assert!(harness.gateway.audit().verify_chain().unwrap().is_intact());
}

#[tokio::test]
async fn test_edited_history_is_detected_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let harness = Harness::start(open(dir.path()));
        harness.allow("example.com");
        let client = harness.in_process_client();
        client.transport().start().await.unwrap();
        for path in ["a", "b", "c"] {
            let url = format!("https://example.com/{path}");
            client
                .request(ActionType::WebFetch, fetch_payload(&url))
                .await
                .unwrap();
        }
    }

    let store = open(dir.path());
    let rows = store.prefix_scan(b"audit/").unwrap();
    assert_eq!(rows.len(), 6);
    let (key, bytes) = &rows[2];
    let mut row: AuditEntry = serde_json::from_slice(bytes).unwrap();
    let tampered_sequence = row.sequence;
    row.action = "email.send".to_string();
    store.put(key, &serde_json::to_vec(&row).unwrap()).unwrap();

    let harness = Harness::start(store);
    let verification = harness.gateway.audit().verify_chain().unwrap();
    assert_eq!(verification.first_divergence, Some(tampered_sequence));
}
