// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tiered streams cache.
//!
//! A query walks hot → warm → cold and yields `(activity_id, blob)` pairs as
//! each tier answers. Hot results precede warm results precede cold results;
//! within a tier no order is promised.

mod pipeline;

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::{keys, HotCache};
use crate::config::Config;
use crate::db::WarmStore;
use crate::error::Result;
use crate::models::ImportStats;
use crate::strava::StravaSession;

use self::pipeline::ImportPipeline;

/// One streams result: activity id and compressed blob.
pub type StreamsItem = (u64, Vec<u8>);

type PipelineSlot = Arc<Mutex<Option<JoinHandle<ImportStats>>>>;

/// Hot/warm/cold cache of compressed per-activity telemetry.
#[derive(Clone)]
pub struct StreamsCache {
    hot: Arc<dyn HotCache>,
    store: Arc<dyn WarmStore>,
    hot_ttl: Duration,
    offline: bool,
    fetch_concurrency: usize,
    hot_write_batch: usize,
    tracker: TaskTracker,
}

impl StreamsCache {
    pub fn new(hot: Arc<dyn HotCache>, store: Arc<dyn WarmStore>, config: &Config) -> Self {
        Self {
            hot,
            store,
            hot_ttl: config.hot_ttl,
            offline: config.offline,
            fetch_concurrency: config.fetch_concurrency,
            hot_write_batch: config.hot_write_batch.max(1),
            tracker: TaskTracker::new(),
        }
    }

    /// Stream the blobs of `activity_ids`.
    ///
    /// Ids missing from both local tiers are fetched upstream only when a
    /// session is given and the cache is not offline. Ids that produce
    /// nothing are logged and omitted. Nothing runs until the result is
    /// polled.
    pub fn query(&self, activity_ids: &[u64], session: Option<Arc<StravaSession>>) -> StreamsQuery {
        let mut seen = HashSet::new();
        let ids: Vec<u64> = activity_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let cancel = CancellationToken::new();
        let slot: PipelineSlot = Arc::new(Mutex::new(None));
        let inner = self
            .clone()
            .walk_tiers(ids, session, cancel.clone(), slot.clone())
            .boxed();

        StreamsQuery {
            inner,
            cancel,
            pipeline: slot,
        }
    }

    fn walk_tiers(
        self,
        ids: Vec<u64>,
        session: Option<Arc<StravaSession>>,
        cancel: CancellationToken,
        slot: PipelineSlot,
    ) -> impl Stream<Item = StreamsItem> + Send + 'static {
        async_stream::stream! {
            let mut missing: HashSet<u64> = ids.iter().copied().collect();

            for (id, blob) in self.from_hot(&ids).await {
                if cancel.is_cancelled() {
                    return;
                }
                missing.remove(&id);
                yield (id, blob);
            }

            let warm_ids: Vec<u64> = ids.iter().copied().filter(|id| missing.contains(id)).collect();
            for (id, blob) in self.from_warm(&warm_ids).await {
                if cancel.is_cancelled() {
                    return;
                }
                missing.remove(&id);
                yield (id, blob);
            }

            let cold_ids: Vec<u64> = ids.into_iter().filter(|id| missing.contains(id)).collect();
            if cold_ids.is_empty() || cancel.is_cancelled() {
                return;
            }
            let Some(session) = session else {
                tracing::debug!(missing = cold_ids.len(), "No session, skipping cold tier");
                return;
            };
            if self.offline {
                tracing::debug!(missing = cold_ids.len(), "Offline, skipping cold tier");
                return;
            }

            let (tx, mut rx) = mpsc::channel(self.hot_write_batch);
            let pipeline = ImportPipeline {
                hot: self.hot.clone(),
                store: self.store.clone(),
                hot_ttl: self.hot_ttl,
                fetch_concurrency: self.fetch_concurrency,
                hot_write_batch: self.hot_write_batch,
            };
            let handle = self.tracker.spawn(pipeline.run(session, cold_ids, tx, cancel.clone()));
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(handle);
            }

            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
    }

    /// Hot hits, with their expiry refreshed.
    async fn from_hot(&self, ids: &[u64]) -> Vec<StreamsItem> {
        if ids.is_empty() {
            return Vec::new();
        }

        let hot_keys: Vec<String> = ids.iter().map(|id| keys::stream(*id)).collect();
        let values = match self.hot.get_many(&hot_keys).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "Hot tier lookup failed, falling through");
                return Vec::new();
            }
        };

        let (hit_keys, hits): (Vec<String>, Vec<StreamsItem>) = hot_keys
            .into_iter()
            .zip(ids.iter().copied().zip(values))
            .filter_map(|(key, (id, value))| value.map(|blob| (key, (id, blob))))
            .unzip();

        if let Err(e) = self.hot.expire_many(&hit_keys, self.hot_ttl).await {
            tracing::warn!(error = %e, "Failed to refresh hot tier expiry");
        }
        tracing::debug!(requested = ids.len(), hits = hits.len(), "Hot tier lookup");
        hits
    }

    /// Warm hits, written back to the hot tier and touched in the warm tier.
    async fn from_warm(&self, ids: &[u64]) -> Vec<StreamsItem> {
        if ids.is_empty() {
            return Vec::new();
        }

        let docs = match self.store.get_streams(ids).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, "Warm tier lookup failed, falling through");
                return Vec::new();
            }
        };
        if docs.is_empty() {
            return Vec::new();
        }

        let entries: Vec<(String, Vec<u8>)> = docs
            .iter()
            .map(|d| (keys::stream(d.activity_id), d.blob.clone()))
            .collect();
        if let Err(e) = self.hot.set_many(&entries, self.hot_ttl).await {
            tracing::warn!(error = %e, "Failed to promote warm hits to hot tier");
        }
        if let Err(e) = self.store.touch_streams(&docs).await {
            tracing::warn!(error = %e, "Failed to refresh warm tier timestamps");
        }

        tracing::debug!(requested = ids.len(), hits = docs.len(), "Warm tier lookup");
        docs.into_iter().map(|d| (d.activity_id, d.blob)).collect()
    }

    /// Remove activities from both the warm and the hot tier.
    pub async fn delete(&self, activity_ids: &[u64]) -> Result<u64> {
        let deleted = self.store.delete_streams(activity_ids).await?;
        let hot_keys: Vec<String> = activity_ids.iter().map(|id| keys::stream(*id)).collect();
        self.hot.delete_many(&hot_keys).await?;
        tracing::info!(requested = activity_ids.len(), deleted, "Deleted streams");
        Ok(deleted)
    }

    /// Stop accepting imports and wait for running ones to commit.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Lazy result of [`StreamsCache::query`].
///
/// Dropping it or calling [`StreamsQuery::cancel`] stops new upstream
/// requests; requests already issued still complete and their results are
/// committed to both tiers.
pub struct StreamsQuery {
    inner: BoxStream<'static, StreamsItem>,
    cancel: CancellationToken,
    pipeline: PipelineSlot,
}

impl StreamsQuery {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel, then wait for the import this query started (if any) to
    /// commit. Returns that import's statistics.
    pub async fn finish(self) -> Option<ImportStats> {
        self.cancel.cancel();
        let Self {
            inner, pipeline, ..
        } = self;
        drop(inner);

        let handle = pipeline.lock().ok().and_then(|mut slot| slot.take())?;
        match handle.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::error!(error = %e, "Import pipeline task failed");
                None
            }
        }
    }
}

impl Stream for StreamsQuery {
    type Item = StreamsItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::MemoryStore;
    use crate::models::StreamsDocument;

    fn cache() -> (StreamsCache, MemoryCache, MemoryStore) {
        let hot = MemoryCache::new();
        let store = MemoryStore::new();
        let cache = StreamsCache::new(
            Arc::new(hot.clone()),
            Arc::new(store.clone()),
            &Config::test_default(),
        );
        (cache, hot, store)
    }

    #[tokio::test]
    async fn test_hot_results_precede_warm_results() {
        let (cache, hot, store) = cache();
        hot.set(&keys::stream(2), b"hot", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .insert_streams(&[StreamsDocument::new(1, b"warm".to_vec())])
            .await
            .unwrap();

        let results: Vec<StreamsItem> = cache.query(&[1, 2, 3], None).collect().await;
        assert_eq!(
            results,
            vec![(2, b"hot".to_vec()), (1, b"warm".to_vec())]
        );
    }

    #[tokio::test]
    async fn test_warm_hit_is_promoted_to_hot() {
        let (cache, hot, store) = cache();
        store
            .insert_streams(&[StreamsDocument::new(1, b"warm".to_vec())])
            .await
            .unwrap();

        let _: Vec<StreamsItem> = cache.query(&[1], None).collect().await;
        assert_eq!(hot.get(&keys::stream(1)).await.unwrap(), Some(b"warm".to_vec()));
    }

    #[tokio::test]
    async fn test_duplicate_ids_yield_once() {
        let (cache, hot, _) = cache();
        hot.set(&keys::stream(1), b"x", Duration::from_secs(60))
            .await
            .unwrap();
        let results: Vec<StreamsItem> = cache.query(&[1, 1, 1], None).collect().await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_both_tiers() {
        let (cache, hot, store) = cache();
        hot.set(&keys::stream(1), b"x", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .insert_streams(&[StreamsDocument::new(1, b"x".to_vec())])
            .await
            .unwrap();

        assert_eq!(cache.delete(&[1, 2]).await.unwrap(), 1);
        assert!(hot.get(&keys::stream(1)).await.unwrap().is_none());
        assert_eq!(store.streams_len().await, 0);
    }

    #[tokio::test]
    async fn test_query_without_cold_tier_has_no_pipeline() {
        let (cache, _, _) = cache();
        let mut query = cache.query(&[1], None);
        assert!(query.next().await.is_none());
        assert!(query.finish().await.is_none());
    }
}
