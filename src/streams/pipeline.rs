// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cold-tier import: fetch, compress, write back, forward.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::{keys, HotCache};
use crate::codec::blob;
use crate::db::WarmStore;
use crate::models::{ImportStats, StreamsDocument};
use crate::strava::{fetch_many, StravaSession};

/// One import run over the ids the hot and warm tiers could not answer.
///
/// Blobs are forwarded to the consumer as soon as they are compressed, the
/// hot tier is written in groups of `hot_write_batch`, and the warm tier
/// gets a single bulk insert once the cold pass ends, cancelled or not.
pub(crate) struct ImportPipeline {
    pub hot: Arc<dyn HotCache>,
    pub store: Arc<dyn WarmStore>,
    pub hot_ttl: Duration,
    pub fetch_concurrency: usize,
    pub hot_write_batch: usize,
}

impl ImportPipeline {
    pub async fn run(
        self,
        session: Arc<StravaSession>,
        ids: Vec<u64>,
        tx: mpsc::Sender<(u64, Vec<u8>)>,
        cancel: CancellationToken,
    ) -> ImportStats {
        let user_id = session.user_id();
        let requested = ids.len();
        let mut stats = ImportStats::default();
        let mut hot_batch: Vec<(String, Vec<u8>)> = Vec::new();
        let mut warm_docs: Vec<StreamsDocument> = Vec::new();
        let mut seen = 0usize;

        tracing::info!(user_id, requested, "Fetching streams from Strava");

        let mut fetched = Box::pin(fetch_many(
            session,
            ids,
            self.fetch_concurrency,
            cancel.clone(),
        ));

        while let Some((activity_id, result)) = fetched.next().await {
            seen += 1;
            let raw = match result {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    stats.empty += 1;
                    tracing::info!(activity_id, "No streams upstream, skipping");
                    continue;
                }
                Err(e) => {
                    stats.errors += 1;
                    if e.is_rate_limit() {
                        stats.rate_limited = true;
                        tracing::warn!(activity_id, "Rate limited, no further fetches");
                        cancel.cancel();
                    } else if e.is_token_error() {
                        tracing::warn!(activity_id, error = %e, "Authorization rejected, no further fetches");
                        cancel.cancel();
                    } else {
                        tracing::warn!(activity_id, error = %e, "Streams fetch failed");
                    }
                    continue;
                }
            };

            let compressed = match blob::compress(&raw) {
                Ok(b) => b,
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(activity_id, error = %e, "Dropping invalid streams");
                    continue;
                }
            };

            stats.imported += 1;
            hot_batch.push((keys::stream(activity_id), compressed.clone()));
            warm_docs.push(StreamsDocument::new(activity_id, compressed.clone()));
            if hot_batch.len() >= self.hot_write_batch {
                self.flush_hot(&mut hot_batch).await;
            }

            if tx.send((activity_id, compressed)).await.is_err() && !cancel.is_cancelled() {
                tracing::debug!(user_id, "Consumer went away, draining in-flight fetches");
                cancel.cancel();
            }
        }

        stats.skipped = (requested - seen) as u32;
        self.flush_hot(&mut hot_batch).await;
        self.commit_warm(&warm_docs).await;

        tracing::info!(
            user_id,
            fetched = stats.total(),
            imported = stats.imported,
            empty = stats.empty,
            errors = stats.errors,
            skipped = stats.skipped,
            rate_limited = stats.rate_limited,
            "Streams import finished"
        );
        stats
    }

    async fn flush_hot(&self, batch: &mut Vec<(String, Vec<u8>)>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.hot.set_many(batch, self.hot_ttl).await {
            tracing::warn!(count = batch.len(), error = %e, "Hot tier write failed");
        }
        batch.clear();
    }

    async fn commit_warm(&self, docs: &[StreamsDocument]) {
        if docs.is_empty() {
            return;
        }
        match self.store.insert_streams(docs).await {
            Ok(()) => tracing::debug!(count = docs.len(), "Committed streams to warm tier"),
            Err(e) => {
                let ids: Vec<u64> = docs.iter().map(|d| d.activity_id).collect();
                tracing::error!(?ids, error = %e, "Warm tier insert failed, dropping batch");
            }
        }
    }
}
