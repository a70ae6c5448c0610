// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pane agent state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Known agent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    Unknown,
}

impl Default for AgentKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => f.write_str("claude"),
            Self::Codex => f.write_str("codex"),
            Self::Gemini => f.write_str("gemini"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Classified state of a pane's agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneStatus {
    Idle,
    Running,
    WaitingInput,
    Completed,
    Failed,
}

impl PaneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingInput => "waiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state transition derived from an event.
///
/// `refined` is true when the status came from a recognized `raw_payload`
/// cue rather than the event type alone; refined observations replace
/// unrefined ones for the same dedupe key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: PaneStatus,
    pub reason_code: Option<String>,
    pub refined: bool,
}

/// Derive the new pane status from an event type and its payload.
///
/// Payload parsing is best-effort: a JSON object with a recognized `type`
/// wins over the event type; anything else falls back to the event type.
/// Unknown event types route to no-op (`None`).
pub fn derive_status(
    event_type: &str,
    raw_payload: Option<&serde_json::Value>,
) -> Option<StatusChange> {
    if let Some(cue) = raw_payload
        .and_then(|v| v.as_object())
        .and_then(|o| o.get("type"))
        .and_then(|t| t.as_str())
    {
        if cue == "input-requested" {
            return Some(StatusChange {
                status: PaneStatus::WaitingInput,
                reason_code: Some("input_required".to_owned()),
                refined: true,
            });
        }
    }

    match event_type {
        "agent-turn-start" => {
            Some(StatusChange { status: PaneStatus::Running, reason_code: None, refined: false })
        }
        "agent-turn-complete" => {
            Some(StatusChange { status: PaneStatus::Completed, reason_code: None, refined: false })
        }
        "input-requested" => Some(StatusChange {
            status: PaneStatus::WaitingInput,
            reason_code: Some("input_required".to_owned()),
            refined: false,
        }),
        "agent-error" => {
            let reason = raw_payload
                .and_then(|v| v.as_object())
                .and_then(|o| o.get("code").or_else(|| o.get("error_code")))
                .and_then(|c| c.as_str())
                .unwrap_or("agent_error")
                .to_owned();
            Some(StatusChange {
                status: PaneStatus::Failed,
                reason_code: Some(reason),
                refined: false,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
