// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resync requests: full-pane recapture after layout or stream changes.

use serde::{Deserialize, Serialize};

use crate::capture::PaneTracker;
use crate::target::PaneKey;
use crate::telemetry::Telemetry;

/// Why a pane needs a full resync. Closed, versioned set; the wire
/// strings are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncReason {
    LayoutChange,
    BridgeReconnect,
    InitialAttach,
}

impl ResyncReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LayoutChange => "layout_change",
            Self::BridgeReconnect => "bridge_reconnect",
            Self::InitialAttach => "initial_attach",
        }
    }
}

impl PaneTracker {
    /// Compare incoming geometry against the cached pane dimensions and
    /// queue a resync when either differs. Updates the cache either way.
    ///
    /// Returns true when a resync was newly queued.
    pub fn mark_resync_on_geometry_diff(
        &mut self,
        key: &PaneKey,
        cols: u16,
        rows: u16,
        reason: ResyncReason,
        telemetry: &Telemetry,
    ) -> bool {
        let Some(pane) = self.get_mut(key) else { return false };

        let changed = pane.last_pane_cols != Some(cols) || pane.last_pane_rows != Some(rows);
        pane.last_pane_cols = Some(cols);
        pane.last_pane_rows = Some(rows);

        if changed && pane.force_resync.is_none() {
            pane.force_resync = Some(reason);
            telemetry.record_resync_queued(reason);
            return true;
        }
        false
    }

    /// Queue a resync unconditionally (initial attach, bridge loss).
    pub fn set_force_resync(&mut self, key: &PaneKey, reason: ResyncReason, telemetry: &Telemetry) {
        if let Some(pane) = self.get_mut(key) {
            if pane.force_resync.is_none() {
                pane.force_resync = Some(reason);
                telemetry.record_resync_queued(reason);
            }
        }
    }

    /// Clear a queued resync, returning the reason if one was set.
    /// Counts the application in telemetry.
    pub fn clear_force_resync(
        &mut self,
        key: &PaneKey,
        telemetry: &Telemetry,
    ) -> Option<ResyncReason> {
        let pane = self.get_mut(key)?;
        let reason = pane.force_resync.take()?;
        telemetry.record_resync_applied(reason);
        Some(reason)
    }
}

#[cfg(test)]
#[path = "resync_tests.rs"]
mod tests;
