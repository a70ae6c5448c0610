// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{TimeZone, Utc};
use serde_json::json;
use yare::parameterized;

use super::{parse_thread_list_hint, parse_thread_timestamp};

#[parameterized(
    rfc3339 = { json!("2026-02-15T01:00:00Z") },
    rfc3339_offset = { json!("2026-02-15T02:00:00+01:00") },
    epoch_seconds = { json!(1_761_147_200_i64) },
    epoch_millis = { json!(1_761_147_200_000_i64) },
    numeric_string = { json!("1761147200") },
)]
fn accepts_timestamp(value: serde_json::Value) {
    let parsed = parse_thread_timestamp(&value).expect("should parse");
    assert!(parsed.timestamp() > 0);
}

#[parameterized(
    null = { json!(null) },
    empty_string = { json!("") },
    whitespace = { json!("   ") },
    garbage = { json!("not-a-date") },
    boolean = { json!(true) },
    array = { json!([1, 2]) },
    zero = { json!(0) },
    negative = { json!(-5) },
)]
fn rejects_timestamp(value: serde_json::Value) {
    assert_eq!(parse_thread_timestamp(&value), None);
}

#[test]
fn seconds_and_millis_agree() {
    let secs = parse_thread_timestamp(&json!(1_761_147_200_i64)).unwrap();
    let millis = parse_thread_timestamp(&json!(1_761_147_200_000_i64)).unwrap();
    assert_eq!(secs, millis);
}

#[test]
fn rfc3339_offsets_normalize_to_utc() {
    let utc = parse_thread_timestamp(&json!("2026-02-15T01:00:00Z")).unwrap();
    let offset = parse_thread_timestamp(&json!("2026-02-15T02:00:00+01:00")).unwrap();
    assert_eq!(utc, offset);
}

#[test]
fn newest_thread_across_both_sources_wins() {
    let response = json!({
        "result": {
            "data": [
                { "id": "t-1", "cwd": "/ws", "updated_at": "2026-02-15T00:00:00Z", "preview": "older" }
            ],
            "threads": [
                { "id": "t-2", "cwd": "/ws", "updated_at": "2026-02-15T01:00:00Z", "preview": "newer" }
            ]
        }
    });
    let hint = parse_thread_list_hint(&response, "/ws").unwrap();
    assert_eq!(hint.label, "newer");
    assert_eq!(hint.at, Utc.with_ymd_and_hms(2026, 2, 15, 1, 0, 0).unwrap());
}

#[test]
fn cwd_must_match_exactly() {
    let response = json!({
        "result": {
            "data": [
                { "id": "t-1", "cwd": "/other", "updated_at": "2026-02-15T00:00:00Z", "preview": "p" }
            ]
        }
    });
    assert!(parse_thread_list_hint(&response, "/ws").is_none());
}

#[test]
fn label_falls_back_to_title_then_id() {
    let response = json!({
        "result": {
            "data": [
                { "id": "t-1", "cwd": "/ws", "updated_at": 1_761_147_200_i64, "title": "my title" }
            ]
        }
    });
    assert_eq!(parse_thread_list_hint(&response, "/ws").unwrap().label, "my title");

    let response = json!({
        "result": {
            "threads": [
                { "id": "t-9", "cwd": "/ws", "updated_at": 1_761_147_200_i64 }
            ]
        }
    });
    assert_eq!(parse_thread_list_hint(&response, "/ws").unwrap().label, "t-9");
}

#[test]
fn threads_without_parsable_timestamps_are_skipped() {
    let response = json!({
        "result": {
            "data": [
                { "id": "t-1", "cwd": "/ws", "updated_at": null, "preview": "bad" },
                { "id": "t-2", "cwd": "/ws", "updated_at": "1761147200", "preview": "good" }
            ]
        }
    });
    assert_eq!(parse_thread_list_hint(&response, "/ws").unwrap().label, "good");
}

#[test]
fn missing_result_or_arrays_is_none() {
    assert!(parse_thread_list_hint(&json!({}), "/ws").is_none());
    assert!(parse_thread_list_hint(&json!({ "result": {} }), "/ws").is_none());
    assert!(parse_thread_list_hint(&json!({ "result": { "data": "nope" } }), "/ws").is_none());
}
