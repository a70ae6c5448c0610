// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Axum handler implementations.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::binder::{BindError, BindOutcome};
use crate::error::{ApiError, ErrorCode};
use crate::event::EventEnvelope;
use crate::state::AgentKind;
use crate::store::{Runtime, StoreError};
use crate::transport::state::Daemon;

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => ApiError::new(ErrorCode::RefConflict, msg),
            StoreError::Unavailable(msg) => ApiError::new(ErrorCode::IoUnavailable, msg),
        }
    }
}

impl From<BindError> for ApiError {
    fn from(e: BindError) -> Self {
        match e {
            BindError::Invalid(msg) => ApiError::invalid(msg),
            BindError::Store(e) => e.into(),
        }
    }
}

/// `POST /v1/events` — ingest one agent notification.
pub async fn post_event(
    State(d): State<Arc<Daemon>>,
    Json(envelope): Json<EventEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    match d.binder.bind_event(envelope, Utc::now()).await? {
        BindOutcome::Bound { runtime_id, state } => {
            let mut body = json!({ "status": "bound", "runtime_id": runtime_id });
            if let Some(state) = state {
                body["state"] = json!(state.status.as_str());
                if let Some(reason) = state.reason_code {
                    body["reason_code"] = json!(reason);
                }
            }
            Ok((StatusCode::ACCEPTED, Json(body)))
        }
        BindOutcome::Parked => {
            Ok((StatusCode::ACCEPTED, Json(json!({ "status": "pending_bind" }))))
        }
    }
}

/// Body for `POST /v1/runtimes`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeRegistration {
    pub target: String,
    pub pane_id: String,
    #[serde(default)]
    pub boot_id: String,
    #[serde(default)]
    pub pane_epoch: u64,
    #[serde(default)]
    pub agent_type: AgentKind,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// `POST /v1/runtimes` — register a detected agent runtime, then replay
/// any parked events for its pane.
pub async fn post_runtime(
    State(d): State<Arc<Daemon>>,
    Json(reg): Json<RuntimeRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    if reg.target.trim().is_empty() || reg.pane_id.trim().is_empty() {
        return Err(ApiError::invalid("target and pane_id are required"));
    }

    let now = Utc::now();
    let runtime = Runtime {
        runtime_id: Uuid::new_v4().to_string(),
        target_id: reg.target.clone(),
        pane_id: reg.pane_id.clone(),
        boot_id: reg.boot_id,
        pane_epoch: reg.pane_epoch,
        agent_type: reg.agent_type,
        pid: reg.pid,
        started_at: reg.started_at.unwrap_or(now),
    };
    let runtime_id = runtime.runtime_id.clone();
    d.store.insert_runtime(runtime).await?;

    let rebound = d.binder.rebind_pending(&reg.target, &reg.pane_id, now).await?;
    Ok((StatusCode::CREATED, Json(json!({ "runtime_id": runtime_id, "rebound": rebound }))))
}

/// Query parameters for the pane listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaneListQuery {
    /// Attach workspace thread hints when an enricher is configured.
    #[serde(default)]
    pub hints: bool,
}

/// `GET /v1/panes` — attached panes with their state-machine cells.
pub async fn list_panes(
    State(d): State<Arc<Daemon>>,
    Query(q): Query<PaneListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut views = Vec::new();
    {
        let sessions = d.sessions.read().await;
        for handle in sessions.values() {
            let session_views = handle.views.read().await;
            views.extend(session_views.values().cloned());
        }
    }

    let states = d.store.list_states().await?;
    let by_pane: HashMap<(String, String), _> =
        states.into_iter().map(|(t, p, s)| ((t, p), s)).collect();

    let hints = if q.hints {
        match d.enricher.as_ref() {
            Some(enricher) => {
                let paths: Vec<String> =
                    views.iter().filter_map(|v| v.current_path.clone()).collect();
                enricher.get_many(&paths).await
            }
            None => HashMap::new(),
        }
    } else {
        HashMap::new()
    };

    let panes: Vec<serde_json::Value> = views
        .into_iter()
        .map(|view| {
            let mut row = serde_json::to_value(&view).unwrap_or_else(|_| json!({}));
            if let Some(state) = by_pane.get(&(view.target.clone(), view.pane_id.clone())) {
                row["state"] = json!(state.status.as_str());
                row["runtime_id"] = json!(state.runtime_id);
                row["last_event_at"] = json!(state.last_event_at);
                if let Some(ref reason) = state.reason_code {
                    row["reason_code"] = json!(reason);
                }
            }
            if let Some(path) = view.current_path.as_deref() {
                if let Some(Ok(hint)) = hints.get(path) {
                    row["thread_hint"] = json!(hint);
                }
            }
            row
        })
        .collect();

    Ok(Json(json!({ "panes": panes })))
}

/// `GET /v1/inbox` — parked events awaiting a binding pass.
pub async fn list_inbox(State(d): State<Arc<Daemon>>) -> Result<impl IntoResponse, ApiError> {
    let entries = d.store.list_pending_inbox().await?;
    Ok(Json(json!({ "pending": entries })))
}

/// `GET /v1/telemetry` — counter snapshot for operators.
pub async fn telemetry_snapshot(State(d): State<Arc<Daemon>>) -> impl IntoResponse {
    Json(json!({ "counters": d.telemetry.snapshot() }))
}

/// `GET /v1/healthz`.
pub async fn health(State(d): State<Arc<Daemon>>) -> impl IntoResponse {
    let sessions = d.sessions.read().await.len();
    Json(json!({
        "status": "ok",
        "uptime_secs": d.started_at.elapsed().as_secs(),
        "sessions": sessions,
    }))
}

/// `POST /v1/shutdown` — initiate graceful daemon shutdown.
pub async fn shutdown(State(d): State<Arc<Daemon>>) -> impl IntoResponse {
    d.shutdown.cancel();
    Json(json!({ "accepted": true }))
}
