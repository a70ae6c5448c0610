// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target and pane identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Field separator for canonical pane keys. Never appears in tmux
/// session names, window ids, or pane ids, so the join is lossless.
const KEY_SEP: char = '\u{1f}';

/// Kind of machine/transport hosting the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Local,
    Ssh,
}

/// Classify a target string (`"local"` or `"ssh:<host>"`).
pub fn target_kind(target: &str) -> TargetKind {
    if target.trim().to_lowercase().starts_with("ssh:") {
        TargetKind::Ssh
    } else {
        TargetKind::Local
    }
}

/// Extract the host from an `ssh:<host>` target.
pub fn ssh_host(target: &str) -> Option<&str> {
    target.trim().strip_prefix("ssh:").map(str::trim).filter(|h| !h.is_empty())
}

/// Identifies one pane within a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneRef {
    pub target: String,
    pub session: String,
    pub window_id: String,
    pub pane_id: String,
}

impl PaneRef {
    /// Canonical key for this pane: lossless join of the four fields with
    /// whitespace trimmed and the target lowercased.
    pub fn canonical_key(&self) -> PaneKey {
        let mut key = String::with_capacity(
            self.target.len() + self.session.len() + self.window_id.len() + self.pane_id.len() + 3,
        );
        key.push_str(&self.target.trim().to_lowercase());
        key.push(KEY_SEP);
        key.push_str(self.session.trim());
        key.push(KEY_SEP);
        key.push_str(self.window_id.trim());
        key.push(KEY_SEP);
        key.push_str(self.pane_id.trim());
        PaneKey(key)
    }
}

impl fmt::Display for PaneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}.{}", self.target, self.session, self.window_id, self.pane_id)
    }
}

/// Canonical pane key. Constructed only via [`PaneRef::canonical_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneKey(String);

impl PaneKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pane-id component of the key (e.g. `%5`).
    pub fn pane_id(&self) -> &str {
        self.0.rsplit(KEY_SEP).next().unwrap_or("")
    }

    /// The target component of the key.
    pub fn target(&self) -> &str {
        self.0.split(KEY_SEP).next().unwrap_or("")
    }
}

impl fmt::Display for PaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.0.split(KEY_SEP);
        let target = parts.next().unwrap_or("");
        let session = parts.next().unwrap_or("");
        let window = parts.next().unwrap_or("");
        let pane = parts.next().unwrap_or("");
        write!(f, "{target}/{session}:{window}.{pane}")
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
