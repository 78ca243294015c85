//! Background refresh scheduling.
//!
//! One long-lived task keeps the index fresh: a best-effort refresh at
//! startup (falling back to the persisted snapshot when the source is
//! down), then one refresh per interval. Failed cycles log and leave the
//! previously served index untouched — ingestion and rebuild failures
//! never reach the query path.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::engine::QaEngine;
use crate::error::QaError;
use crate::fetch::{self, FetchOptions, MessageSource};
use crate::snapshot;

/// Owns the fetch→merge→persist→build→publish cycle.
pub struct Refresher {
    engine: Arc<QaEngine>,
    source: Arc<dyn MessageSource>,
    snapshot_path: PathBuf,
    fetch_opts: FetchOptions,
    interval: Duration,
}

impl Refresher {
    pub fn new(engine: Arc<QaEngine>, source: Arc<dyn MessageSource>, config: &Config) -> Self {
        Self {
            engine,
            source,
            snapshot_path: config.snapshot.path.clone(),
            fetch_opts: FetchOptions::from(&config.source),
            interval: Duration::from_secs(config.refresh.interval_secs),
        }
    }

    /// Startup sequence: try one full refresh; if that fails, serve the
    /// last good persisted snapshot; with neither, stay cold.
    pub async fn startup(&self) {
        self.engine.set_refreshing(true);
        match self.try_refresh().await {
            Ok(added) => {
                tracing::info!(added, "startup refresh complete");
            }
            Err(err) => {
                tracing::warn!(error = %err, "startup refresh failed; falling back to persisted snapshot");
                match snapshot::load(&self.snapshot_path) {
                    Some(snap) if !snap.is_empty() => {
                        tracing::info!(corpus_size = snap.len(), "serving persisted snapshot");
                        self.engine.publish(snap);
                    }
                    _ => {
                        tracing::warn!("no usable persisted snapshot; serving no data until a refresh succeeds");
                    }
                }
            }
        }
        self.engine.set_refreshing(false);
    }

    /// One refresh cycle. On failure the previously served index stays in
    /// place and `last_refresh_time` is not advanced.
    pub async fn refresh_once(&self) -> Result<u64> {
        self.engine.set_refreshing(true);
        let result = self.try_refresh().await;
        self.engine.set_refreshing(false);
        result
    }

    async fn try_refresh(&self) -> Result<u64> {
        let existing = snapshot::load(&self.snapshot_path);
        let known_ids: HashSet<String> = existing
            .iter()
            .flat_map(|s| s.messages.iter())
            .map(|m| m.id.clone())
            .collect();

        let outcome = fetch::fetch_all(self.source.as_ref(), &known_ids, &self.fetch_opts).await;
        let added = outcome.messages.len() as u64;

        if outcome.skipped > 0 {
            tracing::warn!(skipped = outcome.skipped, "ingestion skipped malformed records");
        }

        // A run that neither finished nor found anything new is a failed
        // cycle: keep serving whatever we already have.
        if !outcome.complete && outcome.messages.is_empty() {
            return Err(QaError::SourceUnavailable(
                "ingestion collected no new messages".to_string(),
            )
            .into());
        }

        let merged = snapshot::merge(existing, outcome.messages);
        if merged.is_empty() {
            return Err(QaError::EmptyCorpus.into());
        }

        snapshot::save(&self.snapshot_path, &merged)?;
        tracing::info!(
            added,
            corpus_size = merged.len(),
            complete = outcome.complete,
            pages = outcome.pages,
            "ingestion merged; rebuilding index"
        );

        self.engine.publish_refreshed(merged);
        Ok(added)
    }

    /// Runs the startup sequence, then refreshes every interval until the
    /// shutdown signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.startup().await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup pass above
        // already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(added) => tracing::info!(added, "periodic refresh complete"),
                        Err(err) => {
                            tracing::warn!(error = %err, "refresh cycle failed; keeping previous index");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("refresh task shutting down");
                    break;
                }
            }
        }
    }
}
