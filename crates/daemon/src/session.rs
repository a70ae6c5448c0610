// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-target scheduler: the `tokio::select!` loop that owns one
//! session's pane map and multiplexes taps, the bridge, snapshot ticks,
//! and control commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::BridgeEvent;
use crate::capture::{
    epoch_ms, CaptureConfig, ObservedOutput, OutputPayload, OutputSource, PaneTracker,
};
use crate::resync::ResyncReason;
use crate::snapshot::{capture_pane, MuxRunner};
use crate::store::StateStore;
use crate::tap::{PaneTap, TapChunk, TAP_CHANNEL_CAPACITY};
use crate::target::{target_kind, PaneKey, PaneRef, TargetKind};
use crate::telemetry::Telemetry;

/// Base snapshot tick. Individual panes are gated by the capture policy.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// How often pending background payloads are checked for flushing.
const FLUSH_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Control commands accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    Attach { pane: PaneRef, alias: Option<String>, cwd: Option<String> },
    Detach { key: PaneKey },
    SetForeground { key: Option<PaneKey> },
}

/// An output payload tagged with its pane, as broadcast to consumers.
#[derive(Debug, Clone)]
pub struct OutputEmission {
    pub key: PaneKey,
    pub payload: OutputPayload,
}

/// Immutable per-pane snapshot published for readers outside the
/// scheduler task.
#[derive(Debug, Clone, Serialize)]
pub struct PaneView {
    pub target: String,
    pub session: String,
    pub window_id: String,
    pub pane_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub output_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output_at: Option<u64>,
    pub capture_failures: u32,
    pub foreground: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_path: Option<String>,
}

/// Handle to a spawned session.
#[derive(Clone)]
pub struct SessionHandle {
    pub target: String,
    pub command_tx: mpsc::Sender<SessionCommand>,
    pub views: Arc<RwLock<HashMap<PaneKey, PaneView>>>,
}

impl SessionHandle {
    pub async fn attach(&self, pane: PaneRef, alias: Option<String>, cwd: Option<String>) {
        let _ = self.command_tx.send(SessionCommand::Attach { pane, alias, cwd }).await;
    }

    pub async fn detach(&self, key: PaneKey) {
        let _ = self.command_tx.send(SessionCommand::Detach { key }).await;
    }

    pub async fn set_foreground(&self, key: Option<PaneKey>) {
        let _ = self.command_tx.send(SessionCommand::SetForeground { key }).await;
    }
}

pub struct Session {
    target: String,
    kind: TargetKind,
    runner: Arc<dyn MuxRunner>,
    tracker: PaneTracker,
    telemetry: Arc<Telemetry>,
    store: Arc<dyn StateStore>,
    output_tx: broadcast::Sender<OutputEmission>,
    taps: HashMap<PaneKey, PaneTap>,
    tap_tx: mpsc::Sender<TapChunk>,
    tap_rx: mpsc::Receiver<TapChunk>,
    bridge_rx: Option<mpsc::Receiver<BridgeEvent>>,
    command_rx: mpsc::Receiver<SessionCommand>,
    foreground: Option<PaneKey>,
    /// Per-pane cwd hints from pane discovery, surfaced in views.
    cwd_hints: HashMap<PaneKey, String>,
    views: Arc<RwLock<HashMap<PaneKey, PaneView>>>,
    shutdown: CancellationToken,
}

impl Session {
    /// Build a session and spawn its scheduler task.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        target: String,
        runner: Arc<dyn MuxRunner>,
        capture: CaptureConfig,
        telemetry: Arc<Telemetry>,
        store: Arc<dyn StateStore>,
        output_tx: broadcast::Sender<OutputEmission>,
        bridge_rx: Option<mpsc::Receiver<BridgeEvent>>,
        shutdown: CancellationToken,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (tap_tx, tap_rx) = mpsc::channel(TAP_CHANNEL_CAPACITY);
        let views = Arc::new(RwLock::new(HashMap::new()));
        let kind = target_kind(&target);

        let session = Self {
            target: target.clone(),
            kind,
            runner,
            tracker: PaneTracker::new(capture),
            telemetry,
            store,
            output_tx,
            taps: HashMap::new(),
            tap_tx,
            tap_rx,
            bridge_rx,
            command_rx,
            foreground: None,
            cwd_hints: HashMap::new(),
            views: Arc::clone(&views),
            shutdown,
        };
        tokio::spawn(session.run());

        SessionHandle { target, command_tx, views }
    }

    async fn run(mut self) {
        info!(target = %self.target, "session scheduler started");
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut flush_tick = tokio::time::interval(FLUSH_TICK_INTERVAL);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }

                chunk = self.tap_rx.recv() => {
                    if let Some(chunk) = chunk {
                        self.handle_tap_chunk(chunk);
                    }
                }

                event = recv_bridge(&mut self.bridge_rx) => {
                    self.handle_bridge_event(event);
                }

                _ = tick.tick() => {
                    self.snapshot_pass().await;
                }

                _ = flush_tick.tick() => {
                    self.flush_pass();
                }
            }
        }

        // Drain pending flushes once, then stop taps.
        let now = Instant::now();
        for key in self.tracker.keys() {
            if let Some(payload) = self.tracker.flush_pending_if_ready(&key, now, true) {
                self.emit(&key, payload);
            }
        }
        let taps: Vec<_> = self.taps.drain().map(|(_, tap)| tap).collect();
        for tap in taps {
            tap.stop().await;
        }
        info!(target = %self.target, "session scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Attach { pane, alias, cwd } => {
                if let Err(e) = self.store.upsert_pane(&pane, alias.as_deref()).await {
                    warn!(err = %e, "pane upsert failed");
                }
                let key = self.tracker.attach(pane, alias);
                if let Some(cwd) = cwd.filter(|c| !c.is_empty()) {
                    self.cwd_hints.insert(key.clone(), cwd);
                }
                self.tracker.set_force_resync(&key, ResyncReason::InitialAttach, &self.telemetry);

                if !self.taps.contains_key(&key) {
                    match PaneTap::start(
                        Arc::clone(&self.runner),
                        self.kind,
                        key.clone(),
                        self.tap_tx.clone(),
                        Arc::clone(&self.telemetry),
                    )
                    .await
                    {
                        Ok(tap) => {
                            self.taps.insert(key.clone(), tap);
                        }
                        Err(crate::tap::TapError::UnsupportedTarget) => {
                            debug!(key = %key, "pane tap unsupported for this target");
                        }
                        Err(e) => warn!(key = %key, err = %e, "pane tap failed to start"),
                    }
                }
                self.sync_views();
            }
            SessionCommand::Detach { key } => {
                if let Some(tap) = self.taps.remove(&key) {
                    tap.stop().await;
                }
                let now = Instant::now();
                if let Some(payload) = self.tracker.flush_pending_if_ready(&key, now, true) {
                    self.emit(&key, payload);
                }
                self.tracker.detach(&key);
                self.cwd_hints.remove(&key);
                if self.foreground.as_ref() == Some(&key) {
                    self.foreground = None;
                }
                self.sync_views();
            }
            SessionCommand::SetForeground { key } => {
                self.foreground = key;
                self.sync_views();
            }
        }
    }

    fn handle_tap_chunk(&mut self, chunk: TapChunk) {
        let foreground = self.foreground.as_ref() == Some(&chunk.key);
        let obs = ObservedOutput {
            bytes: chunk.bytes,
            display: None,
            source: OutputSource::PaneTap,
            cursor: None,
            geometry: None,
            at: epoch_ms(),
        };
        let now = Instant::now();
        if let Some(payload) =
            self.tracker.record_observed_output(&chunk.key, obs, foreground, now)
        {
            self.emit(&chunk.key, payload);
        }
    }

    fn handle_bridge_event(&mut self, event: Option<BridgeEvent>) {
        let now = Instant::now();
        match event {
            Some(BridgeEvent::Output { pane_id, bytes }) => {
                let Some(key) = self.key_for_pane_id(&pane_id) else { return };
                self.tracker.mark_bridge_output(&key, now);
                let foreground = self.foreground.as_ref() == Some(&key);
                let obs = ObservedOutput {
                    bytes,
                    display: None,
                    source: OutputSource::Bridge,
                    cursor: None,
                    geometry: None,
                    at: epoch_ms(),
                };
                if let Some(payload) =
                    self.tracker.record_observed_output(&key, obs, foreground, now)
                {
                    self.emit(&key, payload);
                }
            }
            Some(BridgeEvent::LayoutChange { window_id }) => {
                for key in self.keys_in_window(&window_id) {
                    self.tracker.set_force_resync(
                        &key,
                        ResyncReason::LayoutChange,
                        &self.telemetry,
                    );
                }
            }
            Some(BridgeEvent::Exit) | None => {
                if self.bridge_rx.take().is_some() {
                    warn!(target = %self.target, "bridge stream lost, falling back to snapshots");
                    for key in self.tracker.keys() {
                        self.tracker.set_force_resync(
                            &key,
                            ResyncReason::BridgeReconnect,
                            &self.telemetry,
                        );
                    }
                }
            }
        }
    }

    /// One snapshot pass: capture every pane the policy selects.
    async fn snapshot_pass(&mut self) {
        for key in self.tracker.keys() {
            let now = Instant::now();
            let foreground = self.foreground.as_ref() == Some(&key);
            if !self.tracker.should_capture_output(&key, self.kind, foreground, now) {
                continue;
            }
            self.tracker.note_capture_attempt(&key, now);

            let runner = Arc::clone(&self.runner);
            let pane_id = key.pane_id().to_owned();
            let result =
                tokio::task::spawn_blocking(move || capture_pane(runner.as_ref(), &pane_id)).await;

            let now = Instant::now();
            match result {
                Ok(Ok(snap)) => {
                    self.tracker.mark_resync_on_geometry_diff(
                        &key,
                        snap.cols,
                        snap.rows,
                        ResyncReason::LayoutChange,
                        &self.telemetry,
                    );
                    let obs = ObservedOutput {
                        bytes: snap.bytes,
                        display: None,
                        source: OutputSource::Snapshot,
                        cursor: Some((snap.cursor_x, snap.cursor_y)),
                        geometry: Some((snap.cols, snap.rows)),
                        at: epoch_ms(),
                    };
                    if let Some(payload) =
                        self.tracker.record_observed_output(&key, obs, foreground, now)
                    {
                        self.emit(&key, payload);
                    }
                    if let Some(reason) = self.tracker.clear_force_resync(&key, &self.telemetry) {
                        debug!(key = %key, reason = reason.as_str(), "resync applied");
                    }
                }
                Ok(Err(e)) => {
                    self.telemetry.record_capture_failure();
                    if self.tracker.record_capture_failure(&key, now) {
                        warn!(key = %key, err = %e, "pane capture failed");
                    }
                }
                Err(e) => {
                    self.telemetry.record_capture_failure();
                    if self.tracker.record_capture_failure(&key, now) {
                        warn!(key = %key, err = %e, "pane capture task failed");
                    }
                }
            }
        }
    }

    fn flush_pass(&mut self) {
        let now = Instant::now();
        for key in self.tracker.keys() {
            if let Some(payload) = self.tracker.flush_pending_if_ready(&key, now, false) {
                self.emit(&key, payload);
            }
        }
    }

    fn emit(&self, key: &PaneKey, payload: OutputPayload) {
        self.telemetry.record_output(payload.source);
        let _ = self.output_tx.send(OutputEmission { key: key.clone(), payload });
        self.sync_views();
    }

    fn key_for_pane_id(&self, pane_id: &str) -> Option<PaneKey> {
        self.tracker
            .iter()
            .find(|(_, p)| p.pane.pane_id == pane_id)
            .map(|(k, _)| k.clone())
    }

    fn keys_in_window(&self, window_id: &str) -> Vec<PaneKey> {
        self.tracker
            .iter()
            .filter(|(_, p)| p.pane.window_id == window_id)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Publish immutable pane views. Uses `try_write` so the scheduler
    /// never blocks on readers; a contended sync is retried on the next
    /// mutation.
    fn sync_views(&self) {
        let Ok(mut views) = self.views.try_write() else {
            debug!("pane views contended, syncing on next mutation");
            return;
        };
        views.clear();
        for (key, pane) in self.tracker.iter() {
            views.insert(
                key.clone(),
                PaneView {
                    target: pane.pane.target.clone(),
                    session: pane.pane.session.clone(),
                    window_id: pane.pane.window_id.clone(),
                    pane_id: pane.pane.pane_id.clone(),
                    alias: pane.alias.clone(),
                    output_seq: pane.output_seq,
                    last_output_at: pane.last_output_at,
                    capture_failures: pane.capture_failures,
                    foreground: self.foreground.as_ref() == Some(key),
                    current_path: self.cwd_hints.get(key).cloned(),
                },
            );
        }
    }
}

async fn recv_bridge(rx: &mut Option<mpsc::Receiver<BridgeEvent>>) -> Option<BridgeEvent> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
