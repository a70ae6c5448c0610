// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::capture::OutputSource;
use crate::resync::ResyncReason;

use super::Telemetry;

#[test]
fn counters_accumulate() {
    let t = Telemetry::new();
    t.incr("bind.bound");
    t.incr("bind.bound");
    t.add("pane_tap.dropped_chunks", 3);

    let snap = t.snapshot();
    assert_eq!(snap.get("bind.bound"), Some(&2));
    assert_eq!(snap.get("pane_tap.dropped_chunks"), Some(&3));
    assert_eq!(snap.get("never.seen"), None);
}

#[test]
fn output_counters_key_by_source() {
    let t = Telemetry::new();
    t.record_output(OutputSource::Bridge);
    t.record_output(OutputSource::PaneTap);
    t.record_output(OutputSource::PaneTap);
    t.record_output(OutputSource::Snapshot);

    let snap = t.snapshot();
    assert_eq!(snap.get("output.bridge"), Some(&1));
    assert_eq!(snap.get("output.pane_tap"), Some(&2));
    assert_eq!(snap.get("output.snapshot"), Some(&1));
}

#[test]
fn resync_counters_key_by_reason() {
    let t = Telemetry::new();
    t.record_resync_queued(ResyncReason::LayoutChange);
    t.record_resync_queued(ResyncReason::InitialAttach);
    t.record_resync_applied(ResyncReason::LayoutChange);

    let snap = t.snapshot();
    assert_eq!(snap.get("resync_queued.layout_change"), Some(&1));
    assert_eq!(snap.get("resync_queued.initial_attach"), Some(&1));
    assert_eq!(snap.get("resync_applied.layout_change"), Some(&1));
    assert_eq!(snap.get("resync_applied.initial_attach"), None);
}

#[test]
fn snapshot_is_a_copy() {
    let t = Telemetry::new();
    t.incr("capture.failures");
    let snap = t.snapshot();
    t.incr("capture.failures");
    assert_eq!(snap.get("capture.failures"), Some(&1));
    assert_eq!(t.snapshot().get("capture.failures"), Some(&2));
}
