// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incoming event envelopes and their validation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AgentKind;

/// Closed allow-list of event sources. Unknown values are rejected.
pub const EVENT_SOURCES: &[&str] = &["notify", "poll", "hook", "bridge", "manual"];

/// Maximum tolerated clock skew before an event time is clamped to `now`.
pub const MAX_FUTURE_SKEW_SECS: i64 = 5;

/// An incoming agent notification, as posted to `/v1/events`.
///
/// Routing is ambiguous by design: either `runtime_id` or the
/// `target` + `pane_id` pair must resolve to a live runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<String>,
    #[serde(default)]
    pub agent_type: AgentKind,
    /// Must be one of [`EVENT_SOURCES`]; missing and unknown values are
    /// rejected by [`EventEnvelope::validate`] rather than serde so the
    /// caller sees the stable error code.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub event_type: String,
    /// Caller-supplied idempotency token.
    #[serde(default)]
    pub dedupe_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Approximate runtime start time, used to disambiguate candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_hint: Option<DateTime<Utc>>,
    /// Opaque payload. Parsed for state cues when it is a JSON object,
    /// carried untouched otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<serde_json::Value>,
}

impl EventEnvelope {
    /// Validate required fields and the closed source set.
    ///
    /// Returns the stable `ref/invalid` message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if !EVENT_SOURCES.contains(&self.source.as_str()) {
            return Err(format!("unknown source: {}", self.source));
        }
        if self.event_type.trim().is_empty() {
            return Err("event_type is required".to_owned());
        }
        if self.dedupe_key.trim().is_empty() {
            return Err("dedupe_key is required".to_owned());
        }
        let has_pane_ref = matches!(
            (&self.target, &self.pane_id),
            (Some(t), Some(p)) if !t.trim().is_empty() && !p.trim().is_empty()
        );
        let has_runtime = self.runtime_id.as_deref().is_some_and(|r| !r.trim().is_empty());
        if !has_pane_ref && !has_runtime {
            return Err("either runtime_id or target + pane_id is required".to_owned());
        }
        Ok(())
    }
}

/// Sanitize an event time against the server clock.
///
/// Missing times become the receive time; times more than
/// [`MAX_FUTURE_SKEW_SECS`] in the future are clamped to `now`.
pub fn sanitize_event_time(event_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match event_time {
        None => now,
        Some(t) if t > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) => now,
        Some(t) => t,
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
