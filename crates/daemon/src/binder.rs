// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event binding: resolve an envelope to a runtime or park it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::event::{sanitize_event_time, EventEnvelope};
use crate::state::derive_status;
use crate::store::{EventObservation, InboxEntry, PaneStateRecord, Runtime, StateStore, StoreError};
use crate::telemetry::Telemetry;

/// Tolerance between a start hint and the runtime's recorded start.
const START_HINT_TOLERANCE_SECS: i64 = 5;

/// Outcome of one binding attempt.
#[derive(Debug, Clone)]
pub enum BindOutcome {
    /// Resolved and applied. `state` is `None` for no-op event types.
    Bound { runtime_id: String, state: Option<PaneStateRecord> },
    /// Parked on the pending inbox for a later binding pass.
    Parked,
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolves incoming envelopes against the store. Owns no long-lived
/// mutable state besides the store handle.
pub struct Binder {
    store: Arc<dyn StateStore>,
    telemetry: Arc<Telemetry>,
}

impl Binder {
    pub fn new(store: Arc<dyn StateStore>, telemetry: Arc<Telemetry>) -> Self {
        Self { store, telemetry }
    }

    /// Bind one envelope, applying its state transition or parking it.
    ///
    /// Duplicate submissions are indistinguishable from the first
    /// successful one: the response always reports the current effective
    /// state.
    pub async fn bind_event(
        &self,
        envelope: EventEnvelope,
        now: DateTime<Utc>,
    ) -> Result<BindOutcome, BindError> {
        if let Err(msg) = envelope.validate() {
            self.telemetry.record_bind("invalid");
            return Err(BindError::Invalid(msg));
        }

        match self.resolve(&envelope).await? {
            Some(runtime) => {
                let state = self.apply(&envelope, &runtime, now).await?;
                self.telemetry.record_bind("bound");
                Ok(BindOutcome::Bound { runtime_id: runtime.runtime_id, state })
            }
            None => {
                self.store.park_inbox(InboxEntry { envelope, arrived_at: now }).await?;
                self.telemetry.record_bind("pending_bind");
                Ok(BindOutcome::Parked)
            }
        }
    }

    /// Replay parked entries for a pane after a runtime appears.
    /// Returns how many bound; entries that still cannot resolve are
    /// parked again.
    pub async fn rebind_pending(
        &self,
        target: &str,
        pane_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let entries = self.store.take_inbox(target, pane_id).await?;
        let mut bound = 0;
        for entry in entries {
            match self.bind_event(entry.envelope.clone(), now).await {
                Ok(BindOutcome::Bound { .. }) => bound += 1,
                Ok(BindOutcome::Parked) => {}
                Err(BindError::Invalid(msg)) => {
                    debug!(dedupe_key = %entry.envelope.dedupe_key, %msg, "dropping invalid parked event");
                }
                Err(BindError::Store(e)) => {
                    // Put the entry back so nothing is lost, then surface.
                    let _ = self.store.park_inbox(entry).await;
                    return Err(e);
                }
            }
        }
        Ok(bound)
    }

    /// Binding resolution, in order: direct runtime id, then the
    /// (target, pane) pair disambiguated by pid and start-time hints.
    async fn resolve(&self, envelope: &EventEnvelope) -> Result<Option<Runtime>, StoreError> {
        if let Some(id) = envelope.runtime_id.as_deref().filter(|r| !r.trim().is_empty()) {
            if let Some(runtime) = self.store.get_runtime(id).await? {
                return Ok(Some(runtime));
            }
        }

        let (Some(target), Some(pane_id)) = (&envelope.target, &envelope.pane_id) else {
            return Ok(None);
        };

        let candidates = self.store.list_runtimes(target, pane_id).await?;
        let mut matched: Vec<Runtime> =
            candidates.into_iter().filter(|rt| hints_match(envelope, rt)).collect();
        if matched.len() == 1 {
            return Ok(matched.pop());
        }
        Ok(None)
    }

    async fn apply(
        &self,
        envelope: &EventEnvelope,
        runtime: &Runtime,
        now: DateTime<Utc>,
    ) -> Result<Option<PaneStateRecord>, BindError> {
        let Some(change) = derive_status(&envelope.event_type, envelope.raw_payload.as_ref())
        else {
            // Open event-type set: unknown types bind but change nothing.
            let state = self.store.get_state(&runtime.target_id, &runtime.pane_id).await?;
            return Ok(state);
        };

        let obs = EventObservation {
            runtime_id: runtime.runtime_id.clone(),
            target_id: runtime.target_id.clone(),
            pane_id: runtime.pane_id.clone(),
            change,
            event_time: sanitize_event_time(envelope.event_time, now),
        };
        let record = self.store.record_event(&envelope.dedupe_key, obs).await?;
        Ok(Some(record))
    }
}

fn hints_match(envelope: &EventEnvelope, runtime: &Runtime) -> bool {
    if let Some(pid) = envelope.pid {
        if runtime.pid != Some(pid) {
            return false;
        }
    }
    if let Some(hint) = envelope.start_hint {
        if (hint - runtime.started_at).num_seconds().abs() > START_HINT_TOLERANCE_SECS {
            return false;
        }
    }
    true
}

#[cfg(test)]
#[path = "binder_tests.rs"]
mod tests;
