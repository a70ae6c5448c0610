// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API surface.

pub mod http;
pub mod state;

pub use state::Daemon;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the daemon's HTTP router.
pub fn build_router(daemon: Arc<Daemon>) -> Router {
    Router::new()
        .route("/v1/events", post(http::post_event))
        .route("/v1/runtimes", post(http::post_runtime))
        .route("/v1/panes", get(http::list_panes))
        .route("/v1/inbox", get(http::list_inbox))
        .route("/v1/telemetry", get(http::telemetry_snapshot))
        .route("/v1/healthz", get(http::health))
        .route("/v1/shutdown", post(http::shutdown))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(daemon)
}
