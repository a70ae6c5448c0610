// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::binder::Binder;
use crate::enrich::ThreadHintEnricher;
use crate::session::{OutputEmission, SessionHandle};
use crate::store::StateStore;
use crate::telemetry::Telemetry;

/// Shared daemon state passed to all handlers via the axum `State`
/// extractor.
pub struct Daemon {
    pub store: Arc<dyn StateStore>,
    pub binder: Binder,
    pub telemetry: Arc<Telemetry>,
    /// Output payload fan-out. Held here so the channel survives with no
    /// subscribers.
    pub output_tx: broadcast::Sender<OutputEmission>,
    /// One scheduler per target.
    pub sessions: RwLock<HashMap<String, SessionHandle>>,
    /// Present when a thread-hint fetcher is configured.
    pub enricher: Option<Arc<ThreadHintEnricher>>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl Daemon {
    pub fn new(
        store: Arc<dyn StateStore>,
        telemetry: Arc<Telemetry>,
        output_tx: broadcast::Sender<OutputEmission>,
        enricher: Option<Arc<ThreadHintEnricher>>,
        shutdown: CancellationToken,
    ) -> Self {
        let binder = Binder::new(Arc::clone(&store), Arc::clone(&telemetry));
        Self {
            store,
            binder,
            telemetry,
            output_tx,
            sessions: RwLock::new(HashMap::new()),
            enricher,
            shutdown,
            started_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("enricher", &self.enricher.is_some()).finish()
    }
}
