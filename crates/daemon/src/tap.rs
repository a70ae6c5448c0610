// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pane tap: a FIFO mirror of one pane's raw byte stream.
//!
//! The multiplexer pipes pane output into a named pipe we own; a reader
//! task forwards 16 KiB chunks onto the session's tap channel. The pipe
//! is opened read-write so reads never see EOF when the writer side
//! detaches transiently.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::snapshot::{shell_quote, MuxRunner};
use crate::target::{PaneKey, TargetKind};
use crate::telemetry::Telemetry;

/// Chunk size for FIFO reads.
const READ_CHUNK: usize = 16 * 1024;

/// Bounded tap channel capacity, shared by all taps of one session.
pub const TAP_CHANNEL_CAPACITY: usize = 512;

/// How long `stop` waits for the reader task to drain.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// One chunk of mirrored pane output.
#[derive(Debug, Clone)]
pub struct TapChunk {
    pub key: PaneKey,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum TapError {
    #[error("pane tap requires a local target")]
    UnsupportedTarget,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Newtype for the FIFO file descriptor, for use with [`AsyncFd`].
struct FifoFd(OwnedFd);

impl AsRawFd for FifoFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for FifoFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

/// Handle to a running pane tap.
pub struct PaneTap {
    path: PathBuf,
    pane_id: String,
    runner: Arc<dyn MuxRunner>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl PaneTap {
    /// Create the FIFO, attach the multiplexer, and start the reader task.
    pub async fn start(
        runner: Arc<dyn MuxRunner>,
        kind: TargetKind,
        key: PaneKey,
        tx: mpsc::Sender<TapChunk>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self, TapError> {
        if kind != TargetKind::Local {
            return Err(TapError::UnsupportedTarget);
        }

        let path = create_fifo()?;
        let pane_id = key.pane_id().to_owned();

        // Attach: mirror the pane's byte stream into the pipe.
        let pipe_cmd = format!("exec cat > {}", shell_quote(&path.display().to_string()));
        let attach_runner = Arc::clone(&runner);
        let attach_pane = pane_id.clone();
        let attach = tokio::task::spawn_blocking(move || {
            attach_runner.run(&["pipe-pane", "-o", "-t", &attach_pane, &pipe_cmd])
        })
        .await
        .map_err(|e| TapError::Io(std::io::Error::other(e)))?;
        if let Err(e) = attach {
            let _ = std::fs::remove_file(&path);
            return Err(TapError::Io(std::io::Error::other(e)));
        }

        let cancel = CancellationToken::new();
        let reader = match spawn_reader(path.clone(), key, tx, telemetry, cancel.clone()) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };

        Ok(Self { path, pane_id, runner, cancel, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detach the multiplexer, stop the reader, and remove the pipe.
    ///
    /// Waits up to 500 ms for the reader to drain; a reader that outlives
    /// the deadline is logged and left detached.
    pub async fn stop(self) {
        self.cancel.cancel();

        let runner = self.runner;
        let pane_id = self.pane_id;
        let detach =
            tokio::task::spawn_blocking(move || runner.run(&["pipe-pane", "-t", &pane_id])).await;
        match detach {
            Ok(Err(e)) => debug!(err = %e, "pane tap detach failed"),
            Err(e) => debug!(err = %e, "pane tap detach task failed"),
            Ok(Ok(_)) => {}
        }

        if tokio::time::timeout(STOP_DRAIN_TIMEOUT, self.reader).await.is_err() {
            warn!(path = %self.path.display(), "pane tap reader did not drain in time");
        }

        let _ = std::fs::remove_file(&self.path);
    }
}

/// Create the process-scoped FIFO directory (mode 0700) and a uniquely
/// named pipe (mode 0600) inside it.
fn create_fifo() -> Result<PathBuf, TapError> {
    let dir = fifo_dir();
    std::fs::create_dir_all(&dir)?;
    std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let path = dir.join(format!("pane-tap-{}-{nanos}.fifo", std::process::id()));

    nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o600))
        .map_err(|e| TapError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
    Ok(path)
}

/// FIFO directory shared by all taps of this daemon process.
pub fn fifo_dir() -> PathBuf {
    std::env::temp_dir().join("agtmux-pane-tap")
}

/// Spawn the FIFO reader task.
///
/// Opens the pipe `O_RDWR | O_NONBLOCK` and reads through [`AsyncFd`] so
/// the loop is cancellable and never blocks a worker thread. A full tap
/// channel drops the newest chunk, counted in telemetry.
fn spawn_reader(
    path: PathBuf,
    key: PaneKey,
    tx: mpsc::Sender<TapChunk>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, TapError> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(&path)?;
    let owned: OwnedFd = file.into();
    let afd = AsyncFd::new(FifoFd(owned))?;

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let readable = tokio::select! {
                _ = cancel.cancelled() => break,
                r = afd.readable() => r,
            };
            let mut guard = match readable {
                Ok(g) => g,
                Err(_) => break,
            };
            match guard.try_io(|inner| {
                nix::unistd::read(inner.get_ref(), &mut buf)
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            }) {
                Ok(Ok(0)) => break, // EOF
                Ok(Ok(n)) => {
                    let chunk =
                        TapChunk { key: key.clone(), bytes: Bytes::copy_from_slice(&buf[..n]) };
                    if tx.try_send(chunk).is_err() {
                        telemetry.record_tap_drop();
                    }
                }
                Ok(Err(_)) => break,
                Err(_would_block) => continue,
            }
        }
    });
    Ok(handle)
}

#[cfg(test)]
#[path = "tap_tests.rs"]
mod tests;
