use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::config::MonitorConfig;
use crate::pan_api::{ActivityEvent, ActivityKind, ApiError, validate_pickcode};

use super::mapper::MappingRules;
use super::refresh::LibraryRefresh;
use super::source::EventFeed;
use super::writer::{StrmWriter, WriteOutcome};
use super::StrmUrl;

/// Cooldown the supervisor waits before restarting a dead engine.
const RESTART_COOLDOWN: Duration = Duration::from_secs(30);

/// Long-running consumer of the account activity feed.
///
/// Each relevant event is mapped to a local path and written as a
/// pointer file with minimal latency. The feed is at-least-once, so a
/// replayed event just overwrites an identical pointer file.
pub struct IncrementalEngine<S> {
    feed: Arc<S>,
    writer: StrmWriter,
    urls: StrmUrl,
    rules: MappingRules,
    refresh: LibraryRefresh,
    cooldown: Duration,
    /// Directory ids are immutable once assigned, so a cached id→path
    /// mapping can go stale (miss) but never wrong.
    dir_paths: TtlCache<u64, String>,
}

impl<S: EventFeed> IncrementalEngine<S> {
    pub fn new(
        feed: Arc<S>,
        writer: StrmWriter,
        urls: StrmUrl,
        rules: MappingRules,
        refresh: LibraryRefresh,
        cfg: &MonitorConfig,
    ) -> Self {
        Self {
            feed,
            writer,
            urls,
            rules,
            refresh,
            cooldown: Duration::from_secs(cfg.cooldown_secs),
            dir_paths: TtlCache::new(
                cfg.id_cache_capacity,
                Duration::from_secs(cfg.id_cache_ttl_secs),
            ),
        }
    }

    /// Consume the feed until the stop signal fires (clean `Ok` exit) or
    /// an unrecoverable error terminates the loop. The engine never
    /// restarts itself; that is [`run_supervised`]'s job.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        tracing::info!("activity monitor started");
        let mut cursor: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("stop signal received, exiting activity monitor");
                return Ok(());
            }

            let batch = tokio::select! {
                _ = cancel.cancelled() => continue,
                result = self.feed.next_batch(cursor.as_deref()) => {
                    let (events, next) = result.context("activity feed failed")?;
                    if next.is_some() {
                        cursor = next;
                    }
                    events
                }
            };

            let mut written = Vec::new();
            for event in &batch {
                match self.handle_event(event).await {
                    Ok(Some(path)) => written.push(path),
                    Ok(None) => {}
                    Err(e @ ApiError::Auth(_)) => {
                        return Err(e).context("activity monitor cannot continue");
                    }
                    Err(e) => {
                        tracing::error!(file = %event.file_name, error = %e, "event failed");
                    }
                }
            }
            self.refresh.notify(&written);

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
    }

    /// Handle one event; `Some` carries the written pointer path.
    /// Everything except a credential rejection is a per-event problem.
    async fn handle_event(&self, event: &ActivityEvent) -> Result<Option<PathBuf>, ApiError> {
        if ActivityKind::from_code(event.kind).is_none() {
            return Ok(None);
        }

        let parent_path = self
            .dir_paths
            .get_or_compute(event.parent_id, || self.feed.dir_path(event.parent_id))
            .await?;
        let remote_path = format!("{}/{}", parent_path.trim_end_matches('/'), event.file_name);

        let Some(rule) = self.rules.resolve(&remote_path) else {
            tracing::debug!(path = %remote_path, "no mapping rule matches");
            return Ok(None);
        };
        let Some(local) = rule.local_target(&remote_path) else {
            return Ok(None);
        };

        if !self.writer.allows(&event.file_name) {
            tracing::warn!(path = %remote_path, "skipping non-media file");
            return Ok(None);
        }

        let pickcode = validate_pickcode(&event.pickcode)?;
        let url = self.urls.pickcode(&pickcode);
        match self.writer.write(&local, &url).await {
            Ok(WriteOutcome::Written(path)) => {
                tracing::info!(path = %path.display(), "pointer written from event");
                Ok(Some(path))
            }
            Ok(WriteOutcome::SkippedExtension) => Ok(None),
            Err(e) => {
                tracing::error!(path = %local.display(), error = %e, "pointer write failed");
                Ok(None)
            }
        }
    }
}

/// Restart policy around the engine: run it, and when it dies, wait out
/// the cooldown and start it again until the stop signal fires.
pub async fn run_supervised<S: EventFeed>(engine: IncrementalEngine<S>, cancel: CancellationToken) {
    loop {
        match engine.run(&cancel).await {
            Ok(()) => break,
            Err(e) => {
                tracing::error!("activity monitor died: {e:#}");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(RESTART_COOLDOWN) => {
                tracing::info!("restarting activity monitor");
            }
        }
    }
    tracing::info!("activity monitor stopped");
}
