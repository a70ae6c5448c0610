// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{derive_status, PaneStatus};

#[test]
fn turn_start_moves_to_running() {
    let change = derive_status("agent-turn-start", None).unwrap();
    assert_eq!(change.status, PaneStatus::Running);
    assert_eq!(change.reason_code, None);
    assert!(!change.refined);
}

#[test]
fn turn_complete_moves_to_completed() {
    let change = derive_status("agent-turn-complete", None).unwrap();
    assert_eq!(change.status, PaneStatus::Completed);
}

#[test]
fn input_requested_event_type_sets_reason() {
    let change = derive_status("input-requested", None).unwrap();
    assert_eq!(change.status, PaneStatus::WaitingInput);
    assert_eq!(change.reason_code.as_deref(), Some("input_required"));
}

#[test]
fn payload_cue_overrides_event_type() {
    let payload = json!({ "type": "input-requested" });
    let change = derive_status("agent-turn-complete", Some(&payload)).unwrap();
    assert_eq!(change.status, PaneStatus::WaitingInput);
    assert_eq!(change.reason_code.as_deref(), Some("input_required"));
    assert!(change.refined);
}

#[test]
fn agent_error_takes_code_from_payload() {
    let payload = json!({ "code": "rate_limited" });
    let change = derive_status("agent-error", Some(&payload)).unwrap();
    assert_eq!(change.status, PaneStatus::Failed);
    assert_eq!(change.reason_code.as_deref(), Some("rate_limited"));
}

#[test]
fn agent_error_without_payload_uses_fallback_reason() {
    let change = derive_status("agent-error", None).unwrap();
    assert_eq!(change.reason_code.as_deref(), Some("agent_error"));
}

#[test]
fn unknown_event_type_is_noop() {
    assert!(derive_status("tool-execution", None).is_none());
    assert!(derive_status("", None).is_none());
}

#[test]
fn opaque_payloads_fall_back_to_event_type() {
    // Non-object payloads are carried but never parsed for cues.
    let payload = json!("not json object");
    let change = derive_status("agent-turn-complete", Some(&payload)).unwrap();
    assert_eq!(change.status, PaneStatus::Completed);
    assert!(!change.refined);

    let payload = json!({ "type": "something-else" });
    let change = derive_status("agent-turn-complete", Some(&payload)).unwrap();
    assert_eq!(change.status, PaneStatus::Completed);
}

#[test]
fn wire_strings() {
    assert_eq!(PaneStatus::WaitingInput.as_str(), "waiting_input");
    assert_eq!(serde_json::to_value(PaneStatus::WaitingInput).unwrap(), json!("waiting_input"));
}
