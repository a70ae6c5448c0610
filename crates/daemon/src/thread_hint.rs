// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing of codex `thread/list` responses into workspace hints.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A cached enrichment: the most recent thread label for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThreadHint {
    pub label: String,
    pub at: DateTime<Utc>,
}

/// Epoch values at or above this are milliseconds, below are seconds.
const EPOCH_MILLIS_CUTOFF: i64 = 1_000_000_000_000;

/// Parse a thread timestamp in any of the shapes the app server emits:
/// RFC 3339 strings, epoch seconds, epoch milliseconds, or numeric
/// strings. Null, empty, and unparsable values return `None`.
pub fn parse_thread_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            s.parse::<i64>().ok().and_then(epoch_to_datetime)
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return epoch_to_datetime(i);
            }
            n.as_f64().and_then(|f| epoch_to_datetime(f as i64))
        }
        _ => None,
    }
}

fn epoch_to_datetime(v: i64) -> Option<DateTime<Utc>> {
    if v <= 0 {
        return None;
    }
    if v >= EPOCH_MILLIS_CUTOFF {
        DateTime::from_timestamp_millis(v)
    } else {
        DateTime::from_timestamp(v, 0)
    }
}

/// Find the most recent thread whose `cwd` equals `workspace`.
///
/// The response may list candidates under `result.data` or
/// `result.threads`; both are searched and the newest `updated_at`
/// across the two wins. The label prefers `preview`, then `title`, then
/// the thread id.
pub fn parse_thread_list_hint(response: &Value, workspace: &str) -> Option<ThreadHint> {
    let result = response.get("result")?;
    let mut best: Option<ThreadHint> = None;

    for key in ["data", "threads"] {
        let Some(threads) = result.get(key).and_then(Value::as_array) else {
            continue;
        };
        for thread in threads {
            let cwd = thread.get("cwd").and_then(Value::as_str).unwrap_or("");
            if cwd != workspace {
                continue;
            }
            let Some(at) = thread.get("updated_at").and_then(|v| parse_thread_timestamp(v)) else {
                continue;
            };
            let Some(label) = thread
                .get("preview")
                .or_else(|| thread.get("title"))
                .or_else(|| thread.get("id"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|b| at > b.at) {
                best = Some(ThreadHint { label: label.to_owned(), at });
            }
        }
    }
    best
}

#[cfg(test)]
#[path = "thread_hint_tests.rs"]
mod tests;
