// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous screen snapshots through the multiplexer CLI.
//!
//! All subprocess work goes through the [`MuxRunner`] seam so sessions
//! can be driven by fakes in tests. Runners are blocking; callers hop
//! through `spawn_blocking`.

use std::path::PathBuf;
use std::process::Command;

use bytes::Bytes;

use crate::target::PaneRef;

const LIST_PANES_FORMAT: &str = "#{session_name}\t#{window_id}\t#{pane_id}\t#{pane_current_command}\t#{pane_current_path}\t#{pane_width}\t#{pane_height}";

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Executes one multiplexer CLI invocation and returns its stdout.
pub trait MuxRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, RunnerError>;
}

/// Runs `tmux` on the local machine, optionally against a specific
/// server socket.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    pub socket: Option<PathBuf>,
}

impl MuxRunner for LocalRunner {
    fn run(&self, args: &[&str]) -> Result<String, RunnerError> {
        let mut cmd = Command::new("tmux");
        if let Some(ref socket) = self.socket {
            cmd.arg("-S").arg(socket);
        }
        cmd.args(args);
        run_command(cmd)
    }
}

/// Runs `tmux` on a remote host over ssh. Arguments are single-quoted so
/// the remote shell sees them verbatim.
#[derive(Debug, Clone)]
pub struct SshRunner {
    pub host: String,
}

impl MuxRunner for SshRunner {
    fn run(&self, args: &[&str]) -> Result<String, RunnerError> {
        let remote = std::iter::once("tmux")
            .chain(args.iter().copied())
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        let mut cmd = Command::new("ssh");
        cmd.arg(&self.host).arg(remote);
        run_command(cmd)
    }
}

fn run_command(mut cmd: Command) -> Result<String, RunnerError> {
    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RunnerError::Failed(stderr.trim().to_owned()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Single-quote a string for shell consumption (`'` becomes `'\''`).
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// A full-pane capture at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneSnapshot {
    pub bytes: Bytes,
    pub cols: u16,
    pub rows: u16,
    pub cursor_x: u16,
    pub cursor_y: u16,
}

/// Capture the pane contents plus geometry and cursor position.
pub fn capture_pane(runner: &dyn MuxRunner, pane_id: &str) -> Result<PaneSnapshot, RunnerError> {
    let content = runner.run(&["capture-pane", "-p", "-e", "-t", pane_id])?;
    let probe = runner.run(&[
        "display-message",
        "-p",
        "-t",
        pane_id,
        "#{pane_width} #{pane_height} #{cursor_x} #{cursor_y}",
    ])?;

    let mut fields = probe.split_whitespace();
    let mut next_u16 = || -> Result<u16, RunnerError> {
        fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| RunnerError::Failed(format!("bad geometry probe: {}", probe.trim())))
    };
    let cols = next_u16()?;
    let rows = next_u16()?;
    let cursor_x = next_u16()?;
    let cursor_y = next_u16()?;

    Ok(PaneSnapshot { bytes: Bytes::from(content.into_bytes()), cols, rows, cursor_x, cursor_y })
}

/// One pane as reported by `list-panes -a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub session: String,
    pub window_id: String,
    pub pane_id: String,
    pub current_cmd: String,
    pub current_path: String,
    pub cols: u16,
    pub rows: u16,
}

impl PaneInfo {
    pub fn pane_ref(&self, target: &str) -> PaneRef {
        PaneRef {
            target: target.to_owned(),
            session: self.session.clone(),
            window_id: self.window_id.clone(),
            pane_id: self.pane_id.clone(),
        }
    }
}

/// List every pane on the server.
pub fn list_panes(runner: &dyn MuxRunner) -> Result<Vec<PaneInfo>, RunnerError> {
    let raw = runner.run(&["list-panes", "-a", "-F", LIST_PANES_FORMAT])?;
    let mut panes = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(session), Some(window_id), Some(pane_id)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let current_cmd = fields.next().unwrap_or_default();
        let current_path = fields.next().unwrap_or_default();
        let cols = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        let rows = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
        panes.push(PaneInfo {
            session: session.to_owned(),
            window_id: window_id.to_owned(),
            pane_id: pane_id.to_owned(),
            current_cmd: current_cmd.to_owned(),
            current_path: current_path.to_owned(),
            cols,
            rows,
        });
    }
    Ok(panes)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
