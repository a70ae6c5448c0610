// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end event ingestion scenarios against the in-process router.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use agtmux::store::{MemoryStore, StateStore};
use agtmux::telemetry::Telemetry;
use agtmux::transport::{build_router, Daemon};

struct Harness {
    server: TestServer,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (output_tx, _) = broadcast::channel(16);
    let daemon = Arc::new(Daemon::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(Telemetry::new()),
        output_tx,
        None,
        CancellationToken::new(),
    ));
    let server = TestServer::new(build_router(daemon)).expect("failed to create test server");
    Harness { server, store }
}

async fn register_runtime(h: &Harness, pane: &str) -> String {
    let resp = h
        .server
        .post("/v1/runtimes")
        .json(&json!({
            "target": "local",
            "pane_id": pane,
            "boot_id": "boot-1",
            "pane_epoch": 0,
            "agent_type": "codex",
        }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    body["runtime_id"].as_str().expect("runtime_id").to_owned()
}

#[tokio::test]
async fn unresolvable_event_is_parked() {
    let h = harness();

    let resp = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%9",
            "source": "notify",
            "event_type": "agent-turn-complete",
            "dedupe_key": "dk1",
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "pending_bind");

    let pending = h.store.list_pending_inbox().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].envelope.target.as_deref(), Some("local"));
    assert_eq!(pending[0].envelope.pane_id.as_deref(), Some("%9"));

    // Operators see the same entry over HTTP.
    let resp = h.server.get("/v1/inbox").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["pending"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bound_event_reports_runtime_and_state() {
    let h = harness();
    let runtime_id = register_runtime(&h, "%1").await;

    let resp = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%1",
            "source": "notify",
            "event_type": "agent-turn-start",
            "dedupe_key": "dk-start",
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "bound");
    assert_eq!(body["runtime_id"], runtime_id.as_str());
    assert_eq!(body["state"], "running");
}

#[tokio::test]
async fn idempotent_retry_with_richer_payload_refines_state() {
    let h = harness();
    register_runtime(&h, "%2").await;

    let first = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%2",
            "source": "notify",
            "event_type": "agent-turn-complete",
            "dedupe_key": "dk2",
        }))
        .await;
    first.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = first.json();
    assert_eq!(body["state"], "completed");

    // Retry with the same dedupe key but a payload carrying a cue.
    let second = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%2",
            "source": "notify",
            "event_type": "agent-turn-complete",
            "event_id": "evt-retry",
            "dedupe_key": "dk2",
            "raw_payload": { "type": "input-requested" },
        }))
        .await;
    second.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = second.json();
    assert_eq!(body["status"], "bound");
    assert_eq!(body["state"], "waiting_input");
    assert_eq!(body["reason_code"], "input_required");

    let state = h.store.get_state("local", "%2").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "waiting_input");
    assert_eq!(state.reason_code.as_deref(), Some("input_required"));
}

#[tokio::test]
async fn duplicate_submission_reports_effective_state_not_duplicate() {
    let h = harness();
    register_runtime(&h, "%3").await;

    let event = json!({
        "target": "local",
        "pane_id": "%3",
        "source": "notify",
        "event_type": "agent-turn-complete",
        "dedupe_key": "dk3",
    });
    let first = h.server.post("/v1/events").json(&event).await;
    let second = h.server.post("/v1/events").json(&event).await;

    let a: serde_json::Value = first.json();
    let b: serde_json::Value = second.json();
    assert_eq!(a["status"], "bound");
    assert_eq!(b["status"], "bound");
    assert_eq!(a["state"], b["state"]);
}

#[tokio::test]
async fn far_future_event_times_are_clamped() {
    let h = harness();
    register_runtime(&h, "%4").await;

    let before = Utc::now();
    let resp = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%4",
            "source": "notify",
            "event_type": "agent-turn-complete",
            "dedupe_key": "dk4",
            "event_time": (before + Duration::hours(24)).to_rfc3339(),
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);

    let state = h.store.get_state("local", "%4").await.unwrap().unwrap();
    assert!(
        state.last_event_at <= Utc::now() + Duration::seconds(5),
        "stored last_event_at was not clamped: {}",
        state.last_event_at
    );
}

#[tokio::test]
async fn runtime_registration_replays_parked_events() {
    let h = harness();

    let resp = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%5",
            "source": "notify",
            "event_type": "input-requested",
            "dedupe_key": "dk5",
        }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "pending_bind");

    let resp = h
        .server
        .post("/v1/runtimes")
        .json(&json!({ "target": "local", "pane_id": "%5" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["rebound"], 1);

    assert!(h.store.list_pending_inbox().await.unwrap().is_empty());
    let state = h.store.get_state("local", "%5").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "waiting_input");
    assert_eq!(state.reason_code.as_deref(), Some("input_required"));
}

#[tokio::test]
async fn pane_epoch_reuse_conflicts() {
    let h = harness();
    register_runtime(&h, "%6").await;

    let resp = h
        .server
        .post("/v1/runtimes")
        .json(&json!({
            "target": "local",
            "pane_id": "%6",
            "pane_epoch": 0,
        }))
        .await;
    resp.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "ref/conflict");

    // A bumped epoch registers cleanly.
    let resp = h
        .server
        .post("/v1/runtimes")
        .json(&json!({
            "target": "local",
            "pane_id": "%6",
            "pane_epoch": 1,
        }))
        .await;
    resp.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn missing_required_fields_use_stable_error_code() {
    let h = harness();

    let resp = h.server.post("/v1/events").json(&json!({ "source": "notify" })).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "ref/invalid");
}

#[tokio::test]
async fn unknown_event_types_bind_without_state_change() {
    let h = harness();
    let runtime_id = register_runtime(&h, "%7").await;

    let resp = h
        .server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%7",
            "source": "hook",
            "event_type": "tool-execution",
            "dedupe_key": "dk7",
        }))
        .await;
    resp.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "bound");
    assert_eq!(body["runtime_id"], runtime_id.as_str());
    assert!(body.get("state").is_none());

    assert!(h.store.get_state("local", "%7").await.unwrap().is_none());
}

#[tokio::test]
async fn pane_listing_includes_stored_state() {
    let h = harness();
    register_runtime(&h, "%8").await;
    h.server
        .post("/v1/events")
        .json(&json!({
            "target": "local",
            "pane_id": "%8",
            "source": "poll",
            "event_type": "agent-turn-start",
            "dedupe_key": "dk8",
        }))
        .await;

    // No session scheduler is running in this harness, so the listing is
    // empty even though state exists; the store is still queryable.
    let resp = h.server.get("/v1/panes").await;
    resp.assert_status_ok();
    let state = h.store.get_state("local", "%8").await.unwrap().unwrap();
    assert_eq!(state.status.as_str(), "running");
}
