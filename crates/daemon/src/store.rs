// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence seam: the `StateStore` trait the binder and sessions
//! consume, plus the in-memory implementation the daemon ships with.
//! Durable engines implement the same trait out of tree.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::event::EventEnvelope;
use crate::state::{AgentKind, PaneStatus, StatusChange};
use crate::target::PaneRef;

/// One agent instance bound to a pane.
///
/// `(target_id, pane_id, pane_epoch)` is unique per live runtime; a
/// recycled pane bumps the epoch so old runtimes are never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    pub runtime_id: String,
    pub target_id: String,
    pub pane_id: String,
    pub boot_id: String,
    pub pane_epoch: u64,
    pub agent_type: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// The state-machine cell for one pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneStateRecord {
    pub runtime_id: String,
    pub status: PaneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    pub last_event_at: DateTime<Utc>,
}

/// A parked event awaiting a runtime it can bind to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub envelope: EventEnvelope,
    pub arrived_at: DateTime<Utc>,
}

/// An accepted event observation, ready to apply to the state machine.
#[derive(Debug, Clone)]
pub struct EventObservation {
    pub runtime_id: String,
    pub target_id: String,
    pub pane_id: String,
    pub change: StatusChange,
    /// Sanitized event time (future skew already clamped).
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Abstract persistence consumed by the binder and sessions.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn upsert_pane(&self, pane: &PaneRef, alias: Option<&str>) -> Result<(), StoreError>;

    /// Register a runtime. Fails with [`StoreError::Conflict`] when a
    /// live runtime already claims `(target, pane, epoch)`.
    async fn insert_runtime(&self, runtime: Runtime) -> Result<(), StoreError>;

    async fn get_runtime(&self, runtime_id: &str) -> Result<Option<Runtime>, StoreError>;

    /// Live runtimes for a pane, newest epoch first.
    async fn list_runtimes(&self, target: &str, pane_id: &str) -> Result<Vec<Runtime>, StoreError>;

    async fn park_inbox(&self, entry: InboxEntry) -> Result<(), StoreError>;

    async fn list_pending_inbox(&self) -> Result<Vec<InboxEntry>, StoreError>;

    /// Remove and return parked entries addressed to a pane.
    async fn take_inbox(&self, target: &str, pane_id: &str) -> Result<Vec<InboxEntry>, StoreError>;

    async fn get_state(
        &self,
        target: &str,
        pane_id: &str,
    ) -> Result<Option<PaneStateRecord>, StoreError>;

    async fn list_states(
        &self,
    ) -> Result<Vec<(String, String, PaneStateRecord)>, StoreError>;

    /// Apply an observation with at-most-once semantics per dedupe key.
    ///
    /// The first observation for a key is authoritative; later arrivals
    /// re-assert it, except that a payload-refined observation replaces
    /// an unrefined one. Returns the effective pane state.
    async fn record_event(
        &self,
        dedupe_key: &str,
        obs: EventObservation,
    ) -> Result<PaneStateRecord, StoreError>;
}

#[derive(Debug, Clone)]
struct PaneRow {
    #[allow(dead_code)]
    pane: PaneRef,
    #[allow(dead_code)]
    alias: Option<String>,
}

#[derive(Default)]
struct MemoryInner {
    panes: HashMap<String, PaneRow>,
    runtimes: HashMap<String, Runtime>,
    inbox: Vec<InboxEntry>,
    states: HashMap<(String, String), PaneStateRecord>,
    events: HashMap<String, EventObservation>,
}

/// In-memory store used by the daemon and its tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn upsert_pane(&self, pane: &PaneRef, alias: Option<&str>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.panes.insert(
            pane.canonical_key().as_str().to_owned(),
            PaneRow { pane: pane.clone(), alias: alias.map(str::to_owned) },
        );
        Ok(())
    }

    async fn insert_runtime(&self, runtime: Runtime) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let clash = inner.runtimes.values().any(|r| {
            r.target_id == runtime.target_id
                && r.pane_id == runtime.pane_id
                && r.pane_epoch == runtime.pane_epoch
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "runtime already registered for {}/{} epoch {}",
                runtime.target_id, runtime.pane_id, runtime.pane_epoch
            )));
        }
        inner.runtimes.insert(runtime.runtime_id.clone(), runtime);
        Ok(())
    }

    async fn get_runtime(&self, runtime_id: &str) -> Result<Option<Runtime>, StoreError> {
        Ok(self.inner.read().await.runtimes.get(runtime_id).cloned())
    }

    async fn list_runtimes(&self, target: &str, pane_id: &str) -> Result<Vec<Runtime>, StoreError> {
        let inner = self.inner.read().await;
        let mut found: Vec<Runtime> = inner
            .runtimes
            .values()
            .filter(|r| r.target_id == target && r.pane_id == pane_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.pane_epoch.cmp(&a.pane_epoch));
        Ok(found)
    }

    async fn park_inbox(&self, entry: InboxEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let dup = inner
            .inbox
            .iter()
            .any(|e| e.envelope.dedupe_key == entry.envelope.dedupe_key);
        if !dup {
            inner.inbox.push(entry);
        }
        Ok(())
    }

    async fn list_pending_inbox(&self) -> Result<Vec<InboxEntry>, StoreError> {
        Ok(self.inner.read().await.inbox.clone())
    }

    async fn take_inbox(&self, target: &str, pane_id: &str) -> Result<Vec<InboxEntry>, StoreError> {
        let mut inner = self.inner.write().await;
        let all = std::mem::take(&mut inner.inbox);
        let (matched, rest): (Vec<_>, Vec<_>) = all.into_iter().partition(|e| {
            e.envelope.target.as_deref() == Some(target)
                && e.envelope.pane_id.as_deref() == Some(pane_id)
        });
        inner.inbox = rest;
        Ok(matched)
    }

    async fn get_state(
        &self,
        target: &str,
        pane_id: &str,
    ) -> Result<Option<PaneStateRecord>, StoreError> {
        let key = (target.to_owned(), pane_id.to_owned());
        Ok(self.inner.read().await.states.get(&key).cloned())
    }

    async fn list_states(
        &self,
    ) -> Result<Vec<(String, String, PaneStateRecord)>, StoreError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .states
            .iter()
            .map(|((t, p), s)| (t.clone(), p.clone(), s.clone()))
            .collect();
        rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        Ok(rows)
    }

    async fn record_event(
        &self,
        dedupe_key: &str,
        obs: EventObservation,
    ) -> Result<PaneStateRecord, StoreError> {
        let mut inner = self.inner.write().await;

        // At-most-once per dedupe key: the stored observation stands
        // unless the new arrival carries a payload-refined status.
        let stored = inner.events.get(dedupe_key).cloned();
        let effective = match stored {
            Some(prev) if !obs.change.refined => prev,
            _ => {
                inner.events.insert(dedupe_key.to_owned(), obs.clone());
                obs
            }
        };

        let state_key = (effective.target_id.clone(), effective.pane_id.clone());
        let record = match inner.states.get(&state_key) {
            // Last-writer-wins by sanitized event time; arrival order
            // breaks ties.
            Some(existing) if effective.event_time < existing.last_event_at => existing.clone(),
            _ => PaneStateRecord {
                runtime_id: effective.runtime_id.clone(),
                status: effective.change.status,
                reason_code: effective.change.reason_code.clone(),
                last_event_at: effective.event_time,
            },
        };
        inner.states.insert(state_key, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
