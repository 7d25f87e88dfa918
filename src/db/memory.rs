//! In-process warm tier with the same semantics as the Firestore store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::{collections, IndexSetting, WarmStore};
use crate::error::{AppError, Result};
use crate::index::SummaryFilter;
use crate::models::{ActivitySummary, StreamsDocument};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<u64, StreamsDocument>,
    summaries: HashMap<u64, ActivitySummary>,
    access: HashMap<u64, i64>,
    settings: HashMap<String, IndexSetting>,
}

impl Inner {
    fn streams_ttl(&self) -> Option<Duration> {
        self.settings
            .values()
            .find(|s| s.collection == collections::STREAMS)
            .and_then(|s| i64::try_from(s.expire_after_secs).ok())
            .and_then(Duration::try_seconds)
    }

    fn is_expired(&self, doc: &StreamsDocument, now: DateTime<Utc>) -> bool {
        self.streams_ttl()
            .and_then(|ttl| doc.written_at.checked_add_signed(ttl))
            .is_some_and(|expiry| expiry <= now)
    }
}

/// `RwLock<HashMap>` store; every batch is applied under one write lock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise batch-drop paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("write rejected (simulated)".to_string()));
        }
        Ok(())
    }

    /// Number of stored streams documents, including expired ones not yet purged.
    pub async fn streams_len(&self) -> usize {
        self.inner.read().await.streams.len()
    }
}

#[async_trait]
impl WarmStore for MemoryStore {
    async fn get_streams(&self, ids: &[u64]) -> Result<Vec<StreamsDocument>> {
        let inner = self.inner.read().await;
        let now = Utc::now();
        Ok(ids
            .iter()
            .filter_map(|id| inner.streams.get(id))
            .filter(|doc| !inner.is_expired(doc, now))
            .cloned()
            .collect())
    }

    async fn insert_streams(&self, docs: &[StreamsDocument]) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        for doc in docs {
            inner.streams.insert(doc.activity_id, doc.clone());
        }
        Ok(())
    }

    async fn touch_streams(&self, docs: &[StreamsDocument]) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        for doc in docs {
            if let Some(stored) = inner.streams.get_mut(&doc.activity_id) {
                stored.written_at = now;
            }
        }
        Ok(())
    }

    async fn delete_streams(&self, ids: &[u64]) -> Result<u64> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        Ok(ids
            .iter()
            .filter(|id| inner.streams.remove(*id).is_some())
            .count() as u64)
    }

    async fn get_summary(&self, id: u64) -> Result<Option<ActivitySummary>> {
        Ok(self.inner.read().await.summaries.get(&id).cloned())
    }

    async fn find_summaries(&self, filter: &SummaryFilter) -> Result<Vec<ActivitySummary>> {
        let inner = self.inner.read().await;
        Ok(inner
            .summaries
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn upsert_summaries(&self, summaries: &[ActivitySummary]) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        for summary in summaries {
            inner.summaries.insert(summary.id, summary.clone());
        }
        Ok(())
    }

    async fn replace_user_summaries(
        &self,
        user_id: u64,
        summaries: &[ActivitySummary],
    ) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        inner.summaries.retain(|_, s| s.user_id != user_id);
        for summary in summaries {
            inner.summaries.insert(summary.id, summary.clone());
        }
        Ok(())
    }

    async fn delete_summaries(&self, ids: &[u64]) -> Result<u64> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        Ok(ids
            .iter()
            .filter(|id| inner.summaries.remove(*id).is_some())
            .count() as u64)
    }

    async fn delete_user_summaries(&self, user_id: u64) -> Result<u64> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let before = inner.summaries.len();
        inner.summaries.retain(|_, s| s.user_id != user_id);
        Ok((before - inner.summaries.len()) as u64)
    }

    async fn touch_user(&self, user_id: u64, at: i64) -> Result<()> {
        self.check_writable()?;
        self.inner.write().await.access.insert(user_id, at);
        Ok(())
    }

    async fn stale_users(&self, cutoff: i64) -> Result<Vec<u64>> {
        let inner = self.inner.read().await;
        let mut users: Vec<u64> = inner
            .access
            .iter()
            .filter(|(_, ts)| **ts < cutoff)
            .map(|(user, _)| *user)
            .collect();
        users.sort_unstable();
        Ok(users)
    }

    async fn delete_user_access(&self, user_id: u64) -> Result<()> {
        self.check_writable()?;
        self.inner.write().await.access.remove(&user_id);
        Ok(())
    }

    async fn list_index_settings(&self) -> Result<Vec<IndexSetting>> {
        let inner = self.inner.read().await;
        let mut settings: Vec<IndexSetting> = inner.settings.values().cloned().collect();
        settings.sort_by_key(|s| s.key());
        Ok(settings)
    }

    async fn put_index_setting(&self, setting: &IndexSetting) -> Result<()> {
        self.check_writable()?;
        self.inner
            .write()
            .await
            .settings
            .insert(setting.key(), setting.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let Some(ttl) = inner.streams_ttl() else {
            return Ok(0);
        };
        let before = inner.streams.len();
        inner.streams.retain(|_, doc| {
            doc.written_at
                .checked_add_signed(ttl)
                .map_or(true, |expiry| expiry > now)
        });
        Ok((before - inner.streams.len()) as u64)
    }
}
