// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed warm tier.
//!
//! Collections:
//! - `streams`: compressed telemetry, base64 blob, TTL policy on `expire_at`
//! - `index`: activity summaries, document id = activity id
//! - `index_access`: per-user last access
//! - `store_settings`: persisted TTL index settings

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{collections, IndexSetting, WarmStore};
use crate::error::{AppError, Result};
use crate::index::SummaryFilter;
use crate::models::{ActivitySummary, IndexAccess, StreamsDocument};

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

const DEFAULT_STREAMS_TTL_SECS: u64 = 30 * 24 * 3600;

/// On-disk shape of a streams document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamsRecord {
    #[serde(rename = "_id")]
    id: u64,
    #[serde(rename = "b")]
    blob: String,
    /// Last write or touch, UTC epoch seconds
    ts: i64,
    #[serde(with = "firestore::serialize_as_timestamp")]
    expire_at: DateTime<Utc>,
}

/// Id-only projection of a streams document, for expiry sweeps.
#[derive(Debug, Deserialize)]
struct StreamsStamp {
    #[serde(rename = "_id")]
    id: u64,
}

/// Latest instant Firestore timestamps can hold (9999-12-31T23:59:59Z).
const MAX_FIRESTORE_SECS: i64 = 253_402_300_799;

/// Expiry stamp for a document written at `written_at`; a TTL reaching past
/// what Firestore can store is clamped to its last representable second.
fn expire_at(written_at: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    i64::try_from(ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| written_at.checked_add_signed(ttl))
        .filter(|t| t.timestamp() <= MAX_FIRESTORE_SECS)
        .or_else(|| DateTime::from_timestamp(MAX_FIRESTORE_SECS, 0))
        .unwrap_or(written_at)
}

impl StreamsRecord {
    fn from_document(doc: &StreamsDocument, ttl_secs: u64) -> Self {
        Self {
            id: doc.activity_id,
            blob: BASE64.encode(&doc.blob),
            ts: doc.written_at.timestamp(),
            expire_at: expire_at(doc.written_at, ttl_secs),
        }
    }

    fn into_document(self) -> Result<StreamsDocument> {
        let blob = BASE64
            .decode(&self.blob)
            .map_err(|e| AppError::Database(format!("Corrupt blob for {}: {}", self.id, e)))?;
        let written_at = Utc
            .timestamp_opt(self.ts, 0)
            .single()
            .ok_or_else(|| AppError::Database(format!("Bad timestamp for {}", self.id)))?;
        Ok(StreamsDocument {
            activity_id: self.id,
            blob,
            written_at,
        })
    }
}

fn db_err(e: impl std::fmt::Display) -> AppError {
    AppError::Database(e.to_string())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Option<firestore::FirestoreDb>,
    streams_ttl_secs: Arc<AtomicU64>,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_client(Some(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_client(Some(client)))
    }

    /// Create a disconnected client; every operation returns an error.
    pub fn new_mock() -> Self {
        Self::with_client(None)
    }

    fn with_client(client: Option<firestore::FirestoreDb>) -> Self {
        Self {
            client,
            streams_ttl_secs: Arc::new(AtomicU64::new(DEFAULT_STREAMS_TTL_SECS)),
        }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    fn streams_ttl_secs(&self) -> u64 {
        self.streams_ttl_secs.load(Ordering::Relaxed)
    }

    fn streams_cutoff(&self) -> i64 {
        Utc::now().timestamp() - self.streams_ttl_secs() as i64
    }

    // ─── Helper Methods ────────────────────────────────────────────

    async fn get_by_ids<T>(&self, collection: &str, ids: &[u64]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let doc_ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let found = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<T>()
            .batch(doc_ids)
            .await
            .map_err(db_err)?
            .filter_map(|(_, doc)| async move { doc })
            .collect::<Vec<T>>()
            .await;
        Ok(found)
    }

    async fn user_summaries(&self, user_id: u64) -> Result<Vec<ActivitySummary>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::INDEX)
            .filter(|q| q.for_all([q.field("U").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(db_err)
    }

    /// Helper to batch write documents using transactions.
    ///
    /// Each chunk of `BATCH_SIZE` commits all-or-nothing.
    async fn batch_upsert<T, F>(&self, items: &[T], collection: &str, id_extractor: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(id_extractor(item))
                    .object(item)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add write to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Failed to commit batch write: {}", e)))?;
        }

        Ok(())
    }

    /// Helper to batch delete documents using transactions.
    async fn batch_delete(&self, ids: &[u64], collection: &str) -> Result<()> {
        let client = self.get_client()?;

        for chunk in ids.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for id in chunk {
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(id.to_string())
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl WarmStore for FirestoreStore {
    // ─── Streams ─────────────────────────────────────────────────

    async fn get_streams(&self, ids: &[u64]) -> Result<Vec<StreamsDocument>> {
        // TTL deletion lags, so expired-but-present documents are filtered here.
        let cutoff = self.streams_cutoff();
        self.get_by_ids::<StreamsRecord>(collections::STREAMS, ids)
            .await?
            .into_iter()
            .filter(|r| r.ts > cutoff)
            .map(StreamsRecord::into_document)
            .collect()
    }

    async fn insert_streams(&self, docs: &[StreamsDocument]) -> Result<()> {
        let ttl = self.streams_ttl_secs();
        let records: Vec<StreamsRecord> = docs
            .iter()
            .map(|doc| StreamsRecord::from_document(doc, ttl))
            .collect();
        self.batch_upsert(&records, collections::STREAMS, |r| r.id.to_string())
            .await?;
        tracing::debug!(count = records.len(), "Inserted streams documents");
        Ok(())
    }

    async fn touch_streams(&self, docs: &[StreamsDocument]) -> Result<()> {
        let client = self.get_client()?;
        let ttl = self.streams_ttl_secs();
        let now = Utc::now();

        for chunk in docs.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let records: Vec<StreamsRecord> = chunk
                .iter()
                .map(|doc| {
                    let mut touched = doc.clone();
                    touched.written_at = now;
                    StreamsRecord::from_document(&touched, ttl)
                })
                .collect();

            for record in &records {
                client
                    .fluent()
                    .update()
                    .fields(["ts", "expire_at"])
                    .in_col(collections::STREAMS)
                    .document_id(record.id.to_string())
                    .object(record)
                    .add_to_transaction(&mut transaction)
                    .map_err(db_err)?;
            }

            transaction.commit().await.map_err(db_err)?;
        }

        Ok(())
    }

    async fn delete_streams(&self, ids: &[u64]) -> Result<u64> {
        let existing: Vec<StreamsRecord> = self.get_by_ids(collections::STREAMS, ids).await?;
        let existing_ids: Vec<u64> = existing.iter().map(|r| r.id).collect();
        self.batch_delete(&existing_ids, collections::STREAMS).await?;
        Ok(existing_ids.len() as u64)
    }

    // ─── Summary index ───────────────────────────────────────────

    async fn get_summary(&self, id: u64) -> Result<Option<ActivitySummary>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::INDEX)
            .obj()
            .one(&id.to_string())
            .await
            .map_err(db_err)
    }

    async fn find_summaries(&self, filter: &SummaryFilter) -> Result<Vec<ActivitySummary>> {
        // Equality on the owner and the start range run server-side; the
        // remaining predicates are applied to the returned documents.
        let user_id = filter.user_id;
        let after = filter.after;
        let before = filter.before;

        let found: Vec<ActivitySummary> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INDEX)
            .filter(move |q| {
                q.for_all([
                    user_id.and_then(|u| q.field("U").eq(u)),
                    after.and_then(|t| q.field("s").greater_than_or_equal(t)),
                    before.and_then(|t| q.field("s").less_than(t)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        Ok(found.into_iter().filter(|s| filter.matches(s)).collect())
    }

    async fn upsert_summaries(&self, summaries: &[ActivitySummary]) -> Result<()> {
        self.batch_upsert(summaries, collections::INDEX, |s| s.id.to_string())
            .await
    }

    async fn replace_user_summaries(
        &self,
        user_id: u64,
        summaries: &[ActivitySummary],
    ) -> Result<()> {
        let existing = self.user_summaries(user_id).await?;

        // Write the new set first so a failure leaves the old entries readable.
        self.batch_upsert(summaries, collections::INDEX, |s| s.id.to_string())
            .await?;

        let keep: std::collections::HashSet<u64> = summaries.iter().map(|s| s.id).collect();
        let stale: Vec<u64> = existing
            .iter()
            .map(|s| s.id)
            .filter(|id| !keep.contains(id))
            .collect();
        self.batch_delete(&stale, collections::INDEX).await?;

        tracing::debug!(
            user_id,
            written = summaries.len(),
            removed = stale.len(),
            "Replaced user index"
        );
        Ok(())
    }

    async fn delete_summaries(&self, ids: &[u64]) -> Result<u64> {
        let existing: Vec<ActivitySummary> = self.get_by_ids(collections::INDEX, ids).await?;
        let existing_ids: Vec<u64> = existing.iter().map(|s| s.id).collect();
        self.batch_delete(&existing_ids, collections::INDEX).await?;
        Ok(existing_ids.len() as u64)
    }

    async fn delete_user_summaries(&self, user_id: u64) -> Result<u64> {
        let ids: Vec<u64> = self
            .user_summaries(user_id)
            .await?
            .iter()
            .map(|s| s.id)
            .collect();
        self.batch_delete(&ids, collections::INDEX).await?;
        Ok(ids.len() as u64)
    }

    // ─── Access records ──────────────────────────────────────────

    async fn touch_user(&self, user_id: u64, at: i64) -> Result<()> {
        let access = IndexAccess {
            user_id,
            last_access: at,
        };
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::INDEX_ACCESS)
            .document_id(user_id.to_string())
            .object(&access)
            .execute()
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn stale_users(&self, cutoff: i64) -> Result<Vec<u64>> {
        let stale: Vec<IndexAccess> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INDEX_ACCESS)
            .filter(move |q| q.for_all([q.field("ts").less_than(cutoff)]))
            .obj()
            .query()
            .await
            .map_err(db_err)?;
        Ok(stale.into_iter().map(|a| a.user_id).collect())
    }

    async fn delete_user_access(&self, user_id: u64) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::INDEX_ACCESS)
            .document_id(user_id.to_string())
            .execute()
            .await
            .map_err(db_err)
    }

    // ─── Index settings ──────────────────────────────────────────

    async fn list_index_settings(&self) -> Result<Vec<IndexSetting>> {
        let settings: Vec<IndexSetting> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::STORE_SETTINGS)
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        if let Some(streams) = settings
            .iter()
            .find(|s| s.collection == collections::STREAMS)
        {
            self.streams_ttl_secs
                .store(streams.expire_after_secs, Ordering::Relaxed);
        }
        Ok(settings)
    }

    async fn put_index_setting(&self, setting: &IndexSetting) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::STORE_SETTINGS)
            .document_id(setting.key())
            .object(setting)
            .execute()
            .await
            .map_err(db_err)?;

        if setting.collection == collections::STREAMS {
            self.streams_ttl_secs
                .store(setting.expire_after_secs, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let cutoff = self.streams_cutoff();
        let expired: Vec<StreamsStamp> = self
            .get_client()?
            .fluent()
            .select()
            .fields(["_id"])
            .from(collections::STREAMS)
            .filter(move |q| q.for_all([q.field("ts").less_than_or_equal(cutoff)]))
            .obj()
            .query()
            .await
            .map_err(db_err)?;

        let ids: Vec<u64> = expired.iter().map(|r| r.id).collect();
        self.batch_delete(&ids, collections::STREAMS).await?;
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Purged expired streams documents");
        }
        Ok(ids.len() as u64)
    }
}
