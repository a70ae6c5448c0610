// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{Duration, Utc};

use super::{sanitize_event_time, EventEnvelope};

fn envelope() -> EventEnvelope {
    serde_json::from_value(serde_json::json!({
        "target": "local",
        "pane_id": "%5",
        "source": "notify",
        "event_type": "agent-turn-complete",
        "dedupe_key": "dk1",
    }))
    .unwrap()
}

#[test]
fn valid_envelope_passes() {
    assert!(envelope().validate().is_ok());
}

#[test]
fn unknown_source_is_rejected() {
    let mut env = envelope();
    env.source = "carrier-pigeon".to_owned();
    let err = env.validate().unwrap_err();
    assert!(err.contains("unknown source"), "{err}");
}

#[test]
fn missing_dedupe_key_is_rejected() {
    let mut env = envelope();
    env.dedupe_key = "  ".to_owned();
    assert!(env.validate().is_err());
}

#[test]
fn missing_event_type_is_rejected() {
    let mut env = envelope();
    env.event_type = String::new();
    assert!(env.validate().is_err());
}

#[test]
fn requires_runtime_or_pane_ref() {
    let mut env = envelope();
    env.target = None;
    env.pane_id = None;
    env.runtime_id = None;
    assert!(env.validate().is_err());

    env.runtime_id = Some("rt-1".to_owned());
    assert!(env.validate().is_ok());
}

#[test]
fn pane_ref_requires_both_halves() {
    let mut env = envelope();
    env.pane_id = None;
    assert!(env.validate().is_err());
}

#[test]
fn envelope_defaults_tolerate_missing_fields() {
    // Missing source/event_type/dedupe_key deserialize to empty strings
    // so validation can produce the stable error code.
    let env: EventEnvelope =
        serde_json::from_value(serde_json::json!({ "pane_id": "%1" })).unwrap();
    assert!(env.validate().is_err());
}

#[test]
fn sanitize_fills_missing_time_with_now() {
    let now = Utc::now();
    assert_eq!(sanitize_event_time(None, now), now);
}

#[test]
fn sanitize_clamps_far_future_times() {
    let now = Utc::now();
    let t = now + Duration::hours(24);
    assert_eq!(sanitize_event_time(Some(t), now), now);
}

#[test]
fn sanitize_keeps_small_skew_and_past_times() {
    let now = Utc::now();
    let slightly_ahead = now + Duration::seconds(3);
    assert_eq!(sanitize_event_time(Some(slightly_ahead), now), slightly_ahead);

    let past = now - Duration::hours(1);
    assert_eq!(sanitize_event_time(Some(past), now), past);
}
