//! Warm tier: durable, queryable persistent store.
//!
//! Holds the compressed streams documents and the activity summary index.
//! Firestore in production, an in-process store for tests and local runs.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreStore;
pub use self::memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::SummaryFilter;
use crate::models::{ActivitySummary, StreamsDocument};

/// Collection names as constants.
pub mod collections {
    pub const STREAMS: &str = "streams";
    pub const INDEX: &str = "index";
    /// Per-user last access, keyed by user id
    pub const INDEX_ACCESS: &str = "index_access";
    /// Persisted index/TTL configuration, keyed by `collection.field`
    pub const STORE_SETTINGS: &str = "store_settings";
}

/// One entry of the store's index listing: a TTL index on a timestamp field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSetting {
    pub collection: String,
    pub field: String,
    pub expire_after_secs: u64,
}

impl IndexSetting {
    pub fn new(collection: &str, field: &str, expire_after_secs: u64) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
            expire_after_secs,
        }
    }

    /// Document id of this setting in the settings collection.
    pub fn key(&self) -> String {
        format!("{}.{}", self.collection, self.field)
    }
}

/// Batched find/insert/update/delete over the warm tier.
///
/// Bulk writes are all-or-nothing where the backend supports it; on error
/// the caller drops the whole batch.
#[async_trait]
pub trait WarmStore: Send + Sync {
    // ─── Streams ─────────────────────────────────────────────────

    /// Live (unexpired) documents among `ids`, in no particular order.
    async fn get_streams(&self, ids: &[u64]) -> Result<Vec<StreamsDocument>>;

    /// Insert or overwrite documents (last write wins).
    async fn insert_streams(&self, docs: &[StreamsDocument]) -> Result<()>;

    /// Bump the write timestamp of documents without rewriting their blobs.
    async fn touch_streams(&self, docs: &[StreamsDocument]) -> Result<()>;

    async fn delete_streams(&self, ids: &[u64]) -> Result<u64>;

    // ─── Summary index ───────────────────────────────────────────

    async fn get_summary(&self, id: u64) -> Result<Option<ActivitySummary>>;

    /// Summaries matching `filter`, unsorted and without limit applied.
    async fn find_summaries(&self, filter: &SummaryFilter) -> Result<Vec<ActivitySummary>>;

    async fn upsert_summaries(&self, summaries: &[ActivitySummary]) -> Result<()>;

    /// Make `summaries` the complete set of entries for `user_id`.
    async fn replace_user_summaries(
        &self,
        user_id: u64,
        summaries: &[ActivitySummary],
    ) -> Result<()>;

    async fn delete_summaries(&self, ids: &[u64]) -> Result<u64>;

    async fn delete_user_summaries(&self, user_id: u64) -> Result<u64>;

    // ─── Access records ──────────────────────────────────────────

    async fn touch_user(&self, user_id: u64, at: i64) -> Result<()>;

    /// Users whose last access is strictly before `cutoff`.
    async fn stale_users(&self, cutoff: i64) -> Result<Vec<u64>>;

    async fn delete_user_access(&self, user_id: u64) -> Result<()>;

    // ─── Index settings ──────────────────────────────────────────

    async fn list_index_settings(&self) -> Result<Vec<IndexSetting>>;

    async fn put_index_setting(&self, setting: &IndexSetting) -> Result<()>;

    /// Best-effort removal of expired streams documents.
    async fn purge_expired(&self) -> Result<u64>;
}
