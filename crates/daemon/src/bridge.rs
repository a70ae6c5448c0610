// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-bridge stream: a `tmux -C` control-mode client whose
//! notifications supply pane output without polling.

use std::path::Path;

use bytes::Bytes;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::snapshot::shell_quote;
use crate::target::{ssh_host, TargetKind};

/// A notification parsed from the control-mode stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Output { pane_id: String, bytes: Bytes },
    LayoutChange { window_id: String },
    Exit,
}

/// Compiled matchers for control-mode notification lines.
pub struct ControlParser {
    output: Regex,
    layout: Regex,
}

impl ControlParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            output: Regex::new(r"^%output (%\S+) (.*)$")?,
            layout: Regex::new(r"^%layout-change (@\S+)")?,
        })
    }

    /// Parse one control-mode line. Lines that are not output, layout, or
    /// exit notifications return `None` (command replies, other
    /// notifications).
    pub fn parse(&self, line: &str) -> Option<BridgeEvent> {
        if let Some(caps) = self.output.captures(line) {
            let pane_id = caps.get(1)?.as_str().to_owned();
            let bytes = decode_octal_escapes(caps.get(2)?.as_str());
            return Some(BridgeEvent::Output { pane_id, bytes });
        }
        if let Some(caps) = self.layout.captures(line) {
            let window_id = caps.get(1)?.as_str().to_owned();
            return Some(BridgeEvent::LayoutChange { window_id });
        }
        if line == "%exit" || line.starts_with("%exit ") {
            return Some(BridgeEvent::Exit);
        }
        None
    }
}

/// Decode tmux control-mode octal escapes (`\ooo`, `\\`) into raw bytes.
pub fn decode_octal_escapes(data: &str) -> Bytes {
    let src = data.as_bytes();
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\\'
            && i + 4 <= src.len()
            && src[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let v = u32::from(src[i + 1] - b'0') * 64
                + u32::from(src[i + 2] - b'0') * 8
                + u32::from(src[i + 3] - b'0');
            out.push(v as u8);
            i += 4;
        } else if src[i] == b'\\' && i + 2 <= src.len() && src[i + 1] == b'\\' {
            out.push(b'\\');
            i += 2;
        } else {
            out.push(src[i]);
            i += 1;
        }
    }
    Bytes::from(out)
}

/// Build the control-mode attach command for a target.
pub fn control_command(
    kind: TargetKind,
    target: &str,
    tmux_socket: Option<&Path>,
    session: &str,
) -> Command {
    match kind {
        TargetKind::Local => {
            let mut cmd = Command::new("tmux");
            if let Some(socket) = tmux_socket {
                cmd.arg("-S").arg(socket);
            }
            cmd.args(["-C", "attach-session", "-t", session]);
            cmd
        }
        TargetKind::Ssh => {
            let host = ssh_host(target).unwrap_or(target);
            let mut remote = vec!["tmux".to_owned()];
            if let Some(socket) = tmux_socket {
                remote.push("-S".to_owned());
                remote.push(socket.display().to_string());
            }
            remote.extend(["-C", "attach-session", "-t", session].map(String::from));
            let remote = remote.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ");
            let mut cmd = Command::new("ssh");
            cmd.arg(host).arg(remote);
            cmd
        }
    }
}

/// Spawn the bridge reader task.
///
/// Reads control-mode lines until the child exits or shutdown fires,
/// forwarding parsed events. A final [`BridgeEvent::Exit`] is always
/// sent so the session can mark panes for resync.
pub fn spawn_bridge(
    mut cmd: Command,
    tx: mpsc::Sender<BridgeEvent>,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let parser = ControlParser::new()?;

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::null());
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("bridge child has no stdout"))?;

    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        info!("bridge stream attached");
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                l = lines.next_line() => l,
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(event) = parser.parse(&line) {
                        let exit = event == BridgeEvent::Exit;
                        if tx.send(event).await.is_err() || exit {
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(err = %e, "bridge stream read error");
                    break;
                }
            }
        }
        let _ = child.start_kill();
        let _ = tx.send(BridgeEvent::Exit).await;
        info!("bridge stream closed");
    });
    Ok(handle)
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
