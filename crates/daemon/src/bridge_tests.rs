// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{decode_octal_escapes, spawn_bridge, BridgeEvent, ControlParser};

fn parser() -> ControlParser {
    ControlParser::new().unwrap()
}

#[test]
fn parses_output_lines() {
    let event = parser().parse("%output %5 hello world");
    assert_eq!(
        event,
        Some(BridgeEvent::Output {
            pane_id: "%5".to_owned(),
            bytes: Bytes::from_static(b"hello world"),
        })
    );
}

#[test]
fn decodes_octal_escapes_in_output() {
    let event = parser().parse(r"%output %5 line\015\012next");
    match event {
        Some(BridgeEvent::Output { bytes, .. }) => {
            assert_eq!(bytes, Bytes::from_static(b"line\r\nnext"));
        }
        other => panic!("expected output event, got {other:?}"),
    }
}

#[test]
fn parses_layout_change() {
    let event = parser().parse("%layout-change @2 d2c5,200x50,0,0,5");
    assert_eq!(event, Some(BridgeEvent::LayoutChange { window_id: "@2".to_owned() }));
}

#[test]
fn parses_exit() {
    assert_eq!(parser().parse("%exit"), Some(BridgeEvent::Exit));
    assert_eq!(parser().parse("%exit detached"), Some(BridgeEvent::Exit));
}

#[test]
fn ignores_replies_and_other_notifications() {
    let p = parser();
    assert_eq!(p.parse("%begin 1 0 0"), None);
    assert_eq!(p.parse("%end 1 0 0"), None);
    assert_eq!(p.parse("%session-changed $1 main"), None);
    assert_eq!(p.parse("plain command output"), None);
    assert_eq!(p.parse(""), None);
}

#[test]
fn octal_decode_handles_backslashes_and_boundaries() {
    assert_eq!(decode_octal_escapes(r"a\\b"), Bytes::from_static(b"a\\b"));
    assert_eq!(decode_octal_escapes(r"\033[31m"), Bytes::from_static(b"\x1b[31m"));
    // Trailing lone backslash is carried through unchanged.
    assert_eq!(decode_octal_escapes("tail\\"), Bytes::from_static(b"tail\\"));
    // Non-octal digits after a backslash are not an escape.
    assert_eq!(decode_octal_escapes(r"\999"), Bytes::from_static(b"\\999"));
    assert_eq!(decode_octal_escapes(""), Bytes::new());
}

#[test]
fn octal_decode_roundtrips_high_bytes() {
    assert_eq!(decode_octal_escapes(r"\377"), Bytes::from_static(&[0xff]));
    assert_eq!(decode_octal_escapes(r"\000"), Bytes::from_static(&[0x00]));
}

#[tokio::test]
async fn bridge_task_forwards_events_and_signals_exit() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let shutdown = CancellationToken::new();

    // A fake control stream: prints two notifications and exits.
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg("printf '%%output %%1 hi\\n%%layout-change @1 x\\n'");

    let handle = spawn_bridge(cmd, tx, shutdown).unwrap();

    let first = rx.recv().await;
    assert_eq!(
        first,
        Some(BridgeEvent::Output { pane_id: "%1".to_owned(), bytes: Bytes::from_static(b"hi") })
    );
    let second = rx.recv().await;
    assert_eq!(second, Some(BridgeEvent::LayoutChange { window_id: "@1".to_owned() }));
    // Stream end is reported as Exit.
    let last = rx.recv().await;
    assert_eq!(last, Some(BridgeEvent::Exit));

    handle.await.unwrap();
}
