// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ssh_host, target_kind, PaneRef, TargetKind};

fn make(target: &str, session: &str, window: &str, pane: &str) -> PaneRef {
    PaneRef {
        target: target.to_owned(),
        session: session.to_owned(),
        window_id: window.to_owned(),
        pane_id: pane.to_owned(),
    }
}

#[test]
fn canonical_key_normalizes_case_and_whitespace() {
    let a = make("Local", "main", "@1", "%5");
    let b = make(" local ", " main", "@1 ", " %5 ");
    assert_eq!(a.canonical_key(), b.canonical_key());
}

#[test]
fn canonical_key_distinguishes_panes() {
    let a = make("local", "main", "@1", "%5");
    let b = make("local", "main", "@1", "%6");
    let c = make("local", "other", "@1", "%5");
    assert_ne!(a.canonical_key(), b.canonical_key());
    assert_ne!(a.canonical_key(), c.canonical_key());
}

#[test]
fn canonical_key_join_is_lossless() {
    // A session name containing the display separators must not collide
    // with a different pane.
    let a = make("local", "main:@1", "", "%5");
    let b = make("local", "main", "@1", "%5");
    assert_ne!(a.canonical_key(), b.canonical_key());
}

#[test]
fn key_exposes_components() {
    let key = make("local", "main", "@1", "%5").canonical_key();
    assert_eq!(key.pane_id(), "%5");
    assert_eq!(key.target(), "local");
    assert_eq!(key.to_string(), "local/main:@1.%5");
}

#[test]
fn target_kind_classification() {
    assert_eq!(target_kind("local"), TargetKind::Local);
    assert_eq!(target_kind("ssh:devbox"), TargetKind::Ssh);
    assert_eq!(target_kind(" SSH:devbox"), TargetKind::Ssh);
    assert_eq!(target_kind("anything-else"), TargetKind::Local);
}

#[test]
fn ssh_host_extraction() {
    assert_eq!(ssh_host("ssh:devbox"), Some("devbox"));
    assert_eq!(ssh_host("ssh: devbox "), Some("devbox"));
    assert_eq!(ssh_host("ssh:"), None);
    assert_eq!(ssh_host("local"), None);
}
