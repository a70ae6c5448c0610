// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread-hint enrichment: a TTL cache with single-flight deduplication
//! over an async fetcher. Fetcher failures are negative-cached briefly
//! so a flapping app server cannot cause a thundering herd.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;

use crate::snapshot::shell_quote;
use crate::thread_hint::{parse_thread_list_hint, ThreadHint};

/// Fetch result; errors are strings so shared futures stay cloneable.
pub type FetchResult = Result<ThreadHint, String>;

/// User-supplied async lookup keyed by workspace path.
pub type HintFetcher = Arc<dyn Fn(String) -> BoxFuture<'static, FetchResult> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub ttl: Duration,
    pub negative_ttl: Duration,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(60), negative_ttl: Duration::from_secs(5) }
    }
}

struct CacheEntry {
    value: FetchResult,
    at: Instant,
}

type FlightFuture = Shared<BoxFuture<'static, FetchResult>>;

pub struct ThreadHintEnricher {
    fetcher: HintFetcher,
    config: EnricherConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, FlightFuture>>,
}

impl ThreadHintEnricher {
    pub fn new(fetcher: HintFetcher, config: EnricherConfig) -> Self {
        Self { fetcher, config, cache: Mutex::new(HashMap::new()), inflight: Mutex::new(HashMap::new()) }
    }

    /// Resolve hints for a set of workspace paths.
    ///
    /// Paths are deduplicated; fresh cache entries are served without a
    /// fetch; concurrent lookups for the same path share one fetcher
    /// invocation.
    pub async fn get_many(&self, paths: &[String]) -> HashMap<String, FetchResult> {
        let unique: BTreeSet<&String> = paths.iter().collect();
        let lookups = unique.into_iter().map(|path| async move {
            let value = self.get_one(path).await;
            (path.clone(), value)
        });
        futures_util::future::join_all(lookups).await.into_iter().collect()
    }

    async fn get_one(&self, path: &str) -> FetchResult {
        if let Some(cached) = self.lookup_cached(path) {
            return cached;
        }

        let flight = self.flight(path);
        let value = flight.await;

        self.cache
            .lock()
            .insert(path.to_owned(), CacheEntry { value: value.clone(), at: Instant::now() });
        self.inflight.lock().remove(path);
        value
    }

    fn lookup_cached(&self, path: &str) -> Option<FetchResult> {
        let cache = self.cache.lock();
        let entry = cache.get(path)?;
        let ttl = match entry.value {
            Ok(_) => self.config.ttl,
            Err(_) => self.config.negative_ttl,
        };
        (entry.at.elapsed() < ttl).then(|| entry.value.clone())
    }

    /// Get or create the shared in-flight future for a path.
    fn flight(&self, path: &str) -> FlightFuture {
        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(path) {
            return existing.clone();
        }
        let fut = (self.fetcher)(path.to_owned()).shared();
        inflight.insert(path.to_owned(), fut.clone());
        fut
    }
}

/// Build a fetcher that runs a configured command with the workspace
/// path appended and parses its stdout as a `thread/list` response.
pub fn command_fetcher(program: String) -> HintFetcher {
    Arc::new(move |workspace: String| {
        let program = program.clone();
        async move {
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(format!("{program} {}", shell_quote(&workspace)))
                .output()
                .await
                .map_err(|e| e.to_string())?;
            if !output.status.success() {
                return Err(format!(
                    "thread hint command exited with status {:?}",
                    output.status.code()
                ));
            }
            let value: serde_json::Value =
                serde_json::from_slice(&output.stdout).map_err(|e| e.to_string())?;
            parse_thread_list_hint(&value, &workspace)
                .ok_or_else(|| format!("no thread found for {workspace}"))
        }
        .boxed()
    })
}

#[cfg(test)]
#[path = "enrich_tests.rs"]
mod tests;
