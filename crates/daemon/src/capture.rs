// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pane capture state: sequence numbers, background coalescing, and
//! failure backoff. All mutation happens on the owning session task.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::resync::ResyncReason;
use crate::target::{PaneKey, PaneRef, TargetKind};

/// How recently the bridge must have streamed for a pane to count as
/// bridge-active.
pub const BRIDGE_ACTIVE_WINDOW: Duration = Duration::from_secs(2);

/// Which capture source produced an output payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    Bridge,
    PaneTap,
    Snapshot,
}

impl OutputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::PaneTap => "pane_tap",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Capture tuning knobs. Defaults match the daemon's shipped behavior;
/// every field is overridable from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub background_interval_local: Duration,
    pub background_interval_ssh: Duration,
    pub pending_drop_watermark: u32,
    pub flush_interval: Duration,
    pub failure_base: Duration,
    pub failure_max: Duration,
    pub failure_throttle_window: Duration,
    /// Skip snapshot captures entirely; output comes from tap + bridge.
    pub stream_only: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            background_interval_local: Duration::from_millis(250),
            background_interval_ssh: Duration::from_secs(1),
            pending_drop_watermark: 4,
            flush_interval: Duration::from_millis(400),
            failure_base: Duration::from_millis(250),
            failure_max: Duration::from_secs(10),
            failure_throttle_window: Duration::from_secs(1),
            stream_only: false,
        }
    }
}

/// Current epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One observation of pane output, before sequencing.
#[derive(Debug, Clone)]
pub struct ObservedOutput {
    pub bytes: Bytes,
    pub display: Option<String>,
    pub source: OutputSource,
    pub cursor: Option<(u16, u16)>,
    pub geometry: Option<(u16, u16)>,
    /// Observation time, epoch ms.
    pub at: u64,
}

/// An emitted capture result. Internal representation is raw bytes;
/// [`OutputFrame`] is the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPayload {
    pub output_seq: u64,
    pub bytes: Bytes,
    pub source: OutputSource,
    pub coalesced: bool,
    pub coalesced_from_seq: Option<u64>,
    pub dropped_chunks: u32,
    pub cursor_x: Option<u16>,
    pub cursor_y: Option<u16>,
    pub pane_cols: Option<u16>,
    pub pane_rows: Option<u16>,
    pub at: u64,
}

/// Wire form of [`OutputPayload`] with base64-encoded bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFrame {
    pub output_seq: u64,
    pub bytes_base64: String,
    pub source: OutputSource,
    pub coalesced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coalesced_from_seq: Option<u64>,
    pub dropped_chunks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_x: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_y: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_cols: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_rows: Option<u16>,
    pub at: u64,
}

impl From<&OutputPayload> for OutputFrame {
    fn from(p: &OutputPayload) -> Self {
        Self {
            output_seq: p.output_seq,
            bytes_base64: BASE64.encode(&p.bytes),
            source: p.source,
            coalesced: p.coalesced,
            coalesced_from_seq: p.coalesced_from_seq,
            dropped_chunks: p.dropped_chunks,
            cursor_x: p.cursor_x,
            cursor_y: p.cursor_y,
            pane_cols: p.pane_cols,
            pane_rows: p.pane_rows,
            at: p.at,
        }
    }
}

/// Latest-wins accumulator for background observations.
#[derive(Debug, Clone)]
struct PendingOutput {
    latest_seq: u64,
    /// Seq of the first observation merged into the pending base.
    coalesce_from: Option<u64>,
    merges: u32,
    dropped: u32,
    bytes: Bytes,
    display: Option<String>,
    source: OutputSource,
    cursor: Option<(u16, u16)>,
    geometry: Option<(u16, u16)>,
    first_observed_at: Instant,
    at: u64,
}

impl PendingOutput {
    fn new(seq: u64, obs: &ObservedOutput, now: Instant) -> Self {
        Self {
            latest_seq: seq,
            coalesce_from: None,
            merges: 0,
            dropped: 0,
            bytes: obs.bytes.clone(),
            display: obs.display.clone(),
            source: obs.source,
            cursor: obs.cursor,
            geometry: obs.geometry,
            first_observed_at: now,
            at: obs.at,
        }
    }

    fn into_payload(self) -> OutputPayload {
        OutputPayload {
            output_seq: self.latest_seq,
            bytes: self.bytes,
            source: self.source,
            coalesced: self.merges >= 1,
            coalesced_from_seq: self.coalesce_from,
            dropped_chunks: self.dropped,
            cursor_x: self.cursor.map(|(x, _)| x),
            cursor_y: self.cursor.map(|(_, y)| y),
            pane_cols: self.geometry.map(|(c, _)| c),
            pane_rows: self.geometry.map(|(_, r)| r),
            at: self.at,
        }
    }
}

/// Live per-pane state owned by a session's scheduler task.
#[derive(Debug)]
pub struct AttachedPane {
    pub pane: PaneRef,
    pub alias: Option<String>,
    pub last_content: Option<Bytes>,
    pub last_output_at: Option<u64>,
    pub last_capture_at: Option<Instant>,
    pub next_capture_at: Option<Instant>,
    pub capture_failures: u32,
    pub last_bridge_at: Option<Instant>,
    /// Next sequence number to assign.
    pub output_seq: u64,
    pub last_pane_cols: Option<u16>,
    pub last_pane_rows: Option<u16>,
    pub force_resync: Option<ResyncReason>,
    pending: Option<PendingOutput>,
    last_failure_logged_at: Option<Instant>,
}

impl AttachedPane {
    fn new(pane: PaneRef, alias: Option<String>) -> Self {
        Self {
            pane,
            alias,
            last_content: None,
            last_output_at: None,
            last_capture_at: None,
            next_capture_at: None,
            capture_failures: 0,
            last_bridge_at: None,
            output_seq: 0,
            last_pane_cols: None,
            last_pane_rows: None,
            force_resync: None,
            pending: None,
            last_failure_logged_at: None,
        }
    }

    pub fn bridge_active(&self, now: Instant) -> bool {
        self.last_bridge_at.is_some_and(|t| now.duration_since(t) < BRIDGE_ACTIVE_WINDOW)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn reset_failure_backoff(&mut self) {
        self.capture_failures = 0;
        self.next_capture_at = None;
        self.last_failure_logged_at = None;
    }
}

/// The per-session pane map plus capture policy.
///
/// Exclusively owned by one scheduler task; readers elsewhere receive
/// immutable snapshots.
#[derive(Debug)]
pub struct PaneTracker {
    config: CaptureConfig,
    panes: IndexMap<PaneKey, AttachedPane>,
}

impl PaneTracker {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config, panes: IndexMap::new() }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Attach a pane. Re-attaching an already-tracked pane is a no-op.
    pub fn attach(&mut self, pane: PaneRef, alias: Option<String>) -> PaneKey {
        let key = pane.canonical_key();
        self.panes.entry(key.clone()).or_insert_with(|| AttachedPane::new(pane, alias));
        key
    }

    pub fn detach(&mut self, key: &PaneKey) -> Option<AttachedPane> {
        self.panes.shift_remove(key)
    }

    pub fn get(&self, key: &PaneKey) -> Option<&AttachedPane> {
        self.panes.get(key)
    }

    pub fn get_mut(&mut self, key: &PaneKey) -> Option<&mut AttachedPane> {
        self.panes.get_mut(key)
    }

    pub fn keys(&self) -> Vec<PaneKey> {
        self.panes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PaneKey, &AttachedPane)> {
        self.panes.iter()
    }

    /// Mark that the bridge streamed for this pane.
    pub fn mark_bridge_output(&mut self, key: &PaneKey, now: Instant) {
        if let Some(pane) = self.panes.get_mut(key) {
            pane.last_bridge_at = Some(now);
        }
    }

    /// Record the start of a snapshot capture attempt.
    pub fn note_capture_attempt(&mut self, key: &PaneKey, now: Instant) {
        if let Some(pane) = self.panes.get_mut(key) {
            pane.last_capture_at = Some(now);
        }
    }

    /// Decide whether to perform a snapshot capture for this pane on this
    /// tick.
    ///
    /// Policy order: failure backoff wins over everything; stream-only
    /// mode disables snapshots; a foreground pane with an active bridge
    /// needs no snapshots; background panes capture on the per-target
    /// interval.
    pub fn should_capture_output(
        &self,
        key: &PaneKey,
        kind: TargetKind,
        foreground: bool,
        now: Instant,
    ) -> bool {
        let Some(pane) = self.panes.get(key) else { return false };

        if let Some(next) = pane.next_capture_at {
            if now < next {
                return false;
            }
        }
        if self.config.stream_only {
            return false;
        }
        if pane.force_resync.is_some() {
            return true;
        }
        if foreground {
            return !pane.bridge_active(now);
        }
        let interval = match kind {
            TargetKind::Local => self.config.background_interval_local,
            TargetKind::Ssh => self.config.background_interval_ssh,
        };
        match pane.last_capture_at {
            Some(last) => now.duration_since(last) >= interval,
            None => true,
        }
    }

    /// Record observed output for a pane.
    ///
    /// Foreground observations emit immediately. Background observations
    /// merge latest-wins into the pending payload; the first merge is
    /// free, each later merge counts one dropped chunk, and reaching the
    /// watermark forces an emission that also counts the superseded
    /// pending payload as dropped.
    pub fn record_observed_output(
        &mut self,
        key: &PaneKey,
        obs: ObservedOutput,
        foreground: bool,
        now: Instant,
    ) -> Option<OutputPayload> {
        let watermark = self.config.pending_drop_watermark;
        let pane = self.panes.get_mut(key)?;

        let seq = pane.output_seq;
        pane.output_seq += 1;
        pane.last_content = Some(obs.bytes.clone());
        pane.last_output_at = Some(obs.at);
        pane.reset_failure_backoff();

        if foreground {
            return Some(OutputPayload {
                output_seq: seq,
                bytes: obs.bytes,
                source: obs.source,
                coalesced: false,
                coalesced_from_seq: None,
                dropped_chunks: 0,
                cursor_x: obs.cursor.map(|(x, _)| x),
                cursor_y: obs.cursor.map(|(_, y)| y),
                pane_cols: obs.geometry.map(|(c, _)| c),
                pane_rows: obs.geometry.map(|(_, r)| r),
                at: obs.at,
            });
        }

        if pane.pending.is_none() {
            pane.pending = Some(PendingOutput::new(seq, &obs, now));
            return None;
        }

        let reached_watermark = match pane.pending.as_mut() {
            Some(p) => {
                p.latest_seq = seq;
                if p.coalesce_from.is_none() {
                    p.coalesce_from = Some(seq);
                } else {
                    p.dropped += 1;
                }
                p.merges += 1;
                p.bytes = obs.bytes;
                p.source = obs.source;
                p.at = obs.at;
                if obs.display.is_some() {
                    p.display = obs.display;
                }
                if obs.cursor.is_some() {
                    p.cursor = obs.cursor;
                }
                if obs.geometry.is_some() {
                    p.geometry = obs.geometry;
                }
                p.merges >= watermark
            }
            None => false,
        };

        if reached_watermark {
            // The forced emission supersedes the accumulating payload.
            if let Some(p) = pane.pending.as_mut() {
                p.dropped += 1;
            }
            return pane.pending.take().map(PendingOutput::into_payload);
        }
        None
    }

    /// Emit the pending payload if it has aged past the flush interval,
    /// or unconditionally when `force` is set.
    pub fn flush_pending_if_ready(
        &mut self,
        key: &PaneKey,
        now: Instant,
        force: bool,
    ) -> Option<OutputPayload> {
        let pane = self.panes.get_mut(key)?;
        let ready = pane.pending.as_ref().is_some_and(|p| {
            force || now.duration_since(p.first_observed_at) >= self.config.flush_interval
        });
        if !ready {
            return None;
        }
        pane.pending.take().map(PendingOutput::into_payload)
    }

    /// Record a capture failure, scheduling exponential backoff.
    ///
    /// Returns true when the failure should be logged: the first failure
    /// per pane, and at most one per throttle window afterwards.
    pub fn record_capture_failure(&mut self, key: &PaneKey, now: Instant) -> bool {
        let Some(pane) = self.panes.get_mut(key) else { return false };

        pane.capture_failures += 1;
        let exp = pane.capture_failures.saturating_sub(1).min(16);
        let delay = self
            .config
            .failure_base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.config.failure_max)
            .min(self.config.failure_max);
        pane.next_capture_at = Some(now + delay);

        match pane.last_failure_logged_at {
            Some(t) if now.duration_since(t) < self.config.failure_throttle_window => false,
            _ => {
                pane.last_failure_logged_at = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
