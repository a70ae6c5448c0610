// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon runner — shared by `main` and integration tests.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::{control_command, spawn_bridge};
use crate::config::Config;
use crate::enrich::{command_fetcher, ThreadHintEnricher};
use crate::session::Session;
use crate::snapshot::{list_panes, LocalRunner, MuxRunner, SshRunner};
use crate::store::MemoryStore;
use crate::target::{ssh_host, TargetKind};
use crate::telemetry::Telemetry;
use crate::transport::{build_router, Daemon};

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / AGTMUX_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("AGTMUX_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Build the runner for the configured target.
fn build_runner(config: &Config) -> Arc<dyn MuxRunner> {
    match config.target_kind() {
        TargetKind::Local => Arc::new(LocalRunner { socket: config.tmux_socket.clone() }),
        TargetKind::Ssh => {
            let host = ssh_host(&config.target).unwrap_or(&config.target).to_owned();
            Arc::new(SshRunner { host })
        }
    }
}

/// Run the daemon until shutdown.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let shutdown = CancellationToken::new();
    let telemetry = Arc::new(Telemetry::new());
    let store = Arc::new(MemoryStore::new());
    let (output_tx, _) = broadcast::channel(256);

    let enricher = config.thread_hint_cmd.as_ref().map(|cmd| {
        Arc::new(ThreadHintEnricher::new(command_fetcher(cmd.clone()), config.enricher()))
    });

    let daemon = Arc::new(Daemon::new(
        Arc::clone(&store) as Arc<dyn crate::store::StateStore>,
        Arc::clone(&telemetry),
        output_tx.clone(),
        enricher,
        shutdown.clone(),
    ));

    // Optional control bridge for the configured session.
    let runner = build_runner(&config);
    let bridge_rx = match config.bridge_session {
        Some(ref session) => {
            let cmd = control_command(
                config.target_kind(),
                &config.target,
                config.tmux_socket.as_deref(),
                session,
            );
            let (tx, rx) = mpsc::channel(256);
            match spawn_bridge(cmd, tx, shutdown.clone()) {
                Ok(_) => Some(rx),
                Err(e) => {
                    warn!(err = %e, "bridge spawn failed, continuing without it");
                    None
                }
            }
        }
        None => None,
    };

    // Spawn the session scheduler for the configured target.
    let handle = Session::spawn(
        config.target.clone(),
        Arc::clone(&runner),
        config.capture(),
        Arc::clone(&telemetry),
        Arc::clone(&store) as Arc<dyn crate::store::StateStore>,
        output_tx.clone(),
        bridge_rx,
        shutdown.clone(),
    );
    daemon.sessions.write().await.insert(config.target.clone(), handle.clone());

    // Attach every discovered pane when requested.
    if config.attach_all {
        let discover_runner = Arc::clone(&runner);
        let discovered =
            tokio::task::spawn_blocking(move || list_panes(discover_runner.as_ref())).await;
        match discovered {
            Ok(Ok(panes)) => {
                info!(count = panes.len(), "attaching discovered panes");
                for info in panes {
                    let cwd =
                        (!info.current_path.is_empty()).then(|| info.current_path.clone());
                    handle.attach(info.pane_ref(&config.target), None, cwd).await;
                }
            }
            Ok(Err(e)) => warn!(err = %e, "pane discovery failed"),
            Err(e) => warn!(err = %e, "pane discovery task failed"),
        }
    }

    // Trace-log emissions so operators can follow output flow.
    {
        let mut output_rx = output_tx.subscribe();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    emission = output_rx.recv() => match emission {
                        Ok(e) => debug!(
                            key = %e.key,
                            seq = e.payload.output_seq,
                            source = e.payload.source.as_str(),
                            coalesced = e.payload.coalesced,
                            "output emitted"
                        ),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!("output subscriber lagged by {n}");
                        }
                        Err(_) => break,
                    }
                }
            }
        });
    }

    // Spawn HTTP server.
    if let Some(port) = config.port {
        let router = build_router(Arc::clone(&daemon));
        let addr = format!("{}:{}", config.host, port);
        let listener = TcpListener::bind(&addr).await?;
        info!("HTTP listening on {}", listener.local_addr()?);
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let result =
                axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
            if let Err(e) = result {
                error!("HTTP server error: {e}");
            }
        });
    }

    // Spawn Unix socket server.
    if let Some(ref socket_path) = config.socket {
        let router = build_router(Arc::clone(&daemon));
        let path = socket_path.clone();
        // Remove stale socket
        let _ = std::fs::remove_file(&path);
        let uds_listener = tokio::net::UnixListener::bind(&path)?;
        info!("Unix socket listening on {path}");
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut make_svc = router.into_make_service();
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    accept = uds_listener.accept() => {
                        match accept {
                            Ok((stream, _)) => {
                                let svc_future = <_ as tower::Service<_>>::call(&mut make_svc, ());
                                tokio::spawn(async move {
                                    let Ok(svc) = svc_future.await;
                                    let io = hyper_util::rt::TokioIo::new(stream);
                                    let hyper_svc = hyper_util::service::TowerToHyperService::new(svc);
                                    let _ = hyper_util::server::conn::auto::Builder::new(
                                        hyper_util::rt::TokioExecutor::new(),
                                    )
                                    .serve_connection_with_upgrades(io, hyper_svc)
                                    .await;
                                });
                            }
                            Err(e) => {
                                debug!("unix socket accept error: {e}");
                            }
                        }
                    }
                }
            }
        });
    }

    // Spawn signal handler.
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            // First signal: graceful shutdown
            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT");
                }
            }
            sd.cancel();

            // Second signal: force exit
            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM again, forcing exit");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT again, forcing exit");
                }
            }
            std::process::exit(130);
        });
    }

    shutdown.cancelled().await;
    info!("daemon stopped");
    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
