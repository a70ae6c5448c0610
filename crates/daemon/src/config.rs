// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::capture::CaptureConfig;
use crate::enrich::EnricherConfig;
use crate::target::{ssh_host, target_kind, TargetKind};

/// Observation daemon for AI coding-agent sessions in tmux.
#[derive(Debug, Parser)]
#[command(name = "agtmux", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "AGTMUX_PORT")]
    pub port: Option<u16>,

    /// Unix socket path for HTTP.
    #[arg(long, env = "AGTMUX_SOCKET")]
    pub socket: Option<String>,

    /// Host address to bind to.
    #[arg(long, env = "AGTMUX_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Target hosting the multiplexer ("local" or "ssh:<host>").
    #[arg(long, env = "AGTMUX_TARGET", default_value = "local")]
    pub target: String,

    /// tmux server socket path (-S) on the target.
    #[arg(long, env = "AGTMUX_TMUX_SOCKET")]
    pub tmux_socket: Option<PathBuf>,

    /// tmux session to attach the control bridge to. No bridge when unset.
    #[arg(long, env = "AGTMUX_BRIDGE_SESSION")]
    pub bridge_session: Option<String>,

    /// Attach every pane discovered on the target at startup.
    #[arg(long, env = "AGTMUX_ATTACH_ALL")]
    pub attach_all: bool,

    /// Disable snapshot captures; output comes from tap + bridge only.
    #[arg(long, env = "AGTMUX_STREAM_ONLY")]
    pub stream_only: bool,

    /// Background snapshot interval for local targets, in ms.
    #[arg(long, env = "AGTMUX_BACKGROUND_INTERVAL_LOCAL_MS", default_value = "250")]
    pub background_interval_local_ms: u64,

    /// Background snapshot interval for ssh targets, in ms.
    #[arg(long, env = "AGTMUX_BACKGROUND_INTERVAL_SSH_MS", default_value = "1000")]
    pub background_interval_ssh_ms: u64,

    /// Pending coalesced merges that force an immediate flush.
    #[arg(long, env = "AGTMUX_PENDING_DROP_WATERMARK", default_value = "4")]
    pub pending_drop_watermark: u32,

    /// Age at which pending background output is flushed, in ms.
    #[arg(long, env = "AGTMUX_FLUSH_INTERVAL_MS", default_value = "400")]
    pub flush_interval_ms: u64,

    /// Capture failure backoff base, in ms.
    #[arg(long, env = "AGTMUX_FAILURE_BASE_MS", default_value = "250")]
    pub failure_base_ms: u64,

    /// Capture failure backoff ceiling, in ms.
    #[arg(long, env = "AGTMUX_FAILURE_MAX_MS", default_value = "10000")]
    pub failure_max_ms: u64,

    /// Window inside which repeated capture failures are swallowed, in ms.
    #[arg(long, env = "AGTMUX_FAILURE_THROTTLE_MS", default_value = "1000")]
    pub failure_throttle_ms: u64,

    /// Thread hint cache TTL, in seconds.
    #[arg(long, env = "AGTMUX_HINT_TTL_SECS", default_value = "60")]
    pub hint_ttl_secs: u64,

    /// Negative-cache TTL for failed hint fetches, in seconds.
    #[arg(long, env = "AGTMUX_HINT_NEGATIVE_TTL_SECS", default_value = "5")]
    pub hint_negative_ttl_secs: u64,

    /// Command producing a thread/list JSON response for a workspace
    /// path. Hint enrichment is disabled when unset.
    #[arg(long, env = "AGTMUX_THREAD_HINT_CMD")]
    pub thread_hint_cmd: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "AGTMUX_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AGTMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port.is_none() && self.socket.is_none() {
            anyhow::bail!("either --port or --socket must be specified");
        }
        if self.pending_drop_watermark == 0 {
            anyhow::bail!("--pending-drop-watermark must be at least 1");
        }
        if self.target_kind() == TargetKind::Ssh && ssh_host(&self.target).is_none() {
            anyhow::bail!("invalid ssh target: {}", self.target);
        }
        Ok(())
    }

    pub fn target_kind(&self) -> TargetKind {
        target_kind(&self.target)
    }

    /// Resolve capture tuning into the scheduler's config struct.
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            background_interval_local: Duration::from_millis(self.background_interval_local_ms),
            background_interval_ssh: Duration::from_millis(self.background_interval_ssh_ms),
            pending_drop_watermark: self.pending_drop_watermark,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            failure_base: Duration::from_millis(self.failure_base_ms),
            failure_max: Duration::from_millis(self.failure_max_ms),
            failure_throttle_window: Duration::from_millis(self.failure_throttle_ms),
            stream_only: self.stream_only,
        }
    }

    pub fn enricher(&self) -> EnricherConfig {
        EnricherConfig {
            ttl: Duration::from_secs(self.hint_ttl_secs),
            negative_ttl: Duration::from_secs(self.hint_negative_ttl_secs),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
