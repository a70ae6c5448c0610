// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing counters. Everything logged is also counted here.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::capture::OutputSource;
use crate::resync::ResyncReason;

/// Aggregated counters keyed by `category.detail` strings.
#[derive(Debug, Default)]
pub struct Telemetry {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, key: &str) {
        self.add(key, 1);
    }

    pub fn add(&self, key: &str, n: u64) {
        let mut counters = self.counters.lock();
        *counters.entry(key.to_owned()).or_insert(0) += n;
    }

    /// Count one emitted output payload by source.
    pub fn record_output(&self, source: OutputSource) {
        self.incr(&format!("output.{}", source.as_str()));
    }

    /// Count a pane-tap chunk dropped on a full channel.
    pub fn record_tap_drop(&self) {
        self.incr("pane_tap.dropped_chunks");
    }

    /// Count a capture failure (throttled or not).
    pub fn record_capture_failure(&self) {
        self.incr("capture.failures");
    }

    pub fn record_resync_queued(&self, reason: ResyncReason) {
        self.incr(&format!("resync_queued.{}", reason.as_str()));
    }

    pub fn record_resync_applied(&self, reason: ResyncReason) {
        self.incr(&format!("resync_applied.{}", reason.as_str()));
    }

    /// Count an event-binding outcome (`bound`, `pending_bind`, `invalid`).
    pub fn record_bind(&self, outcome: &str) {
        self.incr(&format!("bind.{outcome}"));
    }

    /// Snapshot all counters for operators.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
