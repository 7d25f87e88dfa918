// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity summary index.
//!
//! Populated from the user's upstream activity history, queried by time,
//! type, flags and bounding-box overlap, and maintained per record by
//! webhook events. Entries of users who stop querying are evicted by
//! [`SummaryIndex::triage`].

pub mod filter;

pub use filter::SummaryFilter;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;

use crate::cache::{keys, HotCache};
use crate::config::Config;
use crate::db::WarmStore;
use crate::error::{AppError, Result};
use crate::models::{ActivitySummary, ActivityUpdates, ImportProgress, TriageStats};
use crate::strava::{list_all_activities, StravaSession};

/// Answer to a reconciliation query against a caller-held id set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Held ids that no longer match, ascending
    pub delete: Vec<u64>,
    /// Matching entries the caller does not hold, newest first
    pub fetch: Vec<ActivitySummary>,
}

/// Summary index over the warm tier, with the import flag in the hot tier.
#[derive(Clone)]
pub struct SummaryIndex {
    store: Arc<dyn WarmStore>,
    hot: Arc<dyn HotCache>,
    page_size: u32,
    import_flag_ttl: Duration,
    import_error_ttl: Duration,
    retention: Duration,
}

impl SummaryIndex {
    pub fn new(store: Arc<dyn WarmStore>, hot: Arc<dyn HotCache>, config: &Config) -> Self {
        Self {
            store,
            hot,
            page_size: config.page_size,
            import_flag_ttl: config.import_flag_ttl,
            import_error_ttl: config.import_error_ttl,
            retention: config.index_retention,
        }
    }

    // ─── Import flag ─────────────────────────────────────────────

    async fn set_flag(&self, user_id: u64, progress: &ImportProgress, ttl: Duration) {
        let value = match serde_json::to_vec(progress) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to serialize import progress");
                return;
            }
        };
        // The flag is advisory; losing a heartbeat only shortens the lease.
        if let Err(e) = self.hot.set(&keys::import_flag(user_id), &value, ttl).await {
            tracing::warn!(user_id, error = %e, "Failed to write import flag");
        }
    }

    /// Take the import lease. A failed import's flag does not hold it.
    async fn acquire_lease(&self, user_id: u64) -> Result<bool> {
        let key = keys::import_flag(user_id);
        let running = serde_json::to_vec(&ImportProgress::running(0))
            .map_err(|e| AppError::Internal(e.into()))?;

        if self
            .hot
            .set_if_absent(&key, &running, self.import_flag_ttl)
            .await?
        {
            return Ok(true);
        }

        match self.import_status(user_id).await? {
            Some(progress) if !progress.error => Ok(false),
            _ => {
                self.hot.delete(&key).await?;
                self.hot
                    .set_if_absent(&key, &running, self.import_flag_ttl)
                    .await
            }
        }
    }

    async fn fail_import(&self, user_id: u64, error: &AppError) {
        let msg = import_error_message(error);
        self.set_flag(user_id, &ImportProgress::failed(msg), self.import_error_ttl)
            .await;
    }

    /// Current import flag value; `None` when no import is running and no
    /// recent error is pending.
    pub async fn import_status(&self, user_id: u64) -> Result<Option<ImportProgress>> {
        let Some(raw) = self.hot.get(&keys::import_flag(user_id)).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| AppError::Cache(format!("Corrupt import flag: {}", e)))
    }

    // ─── Import ──────────────────────────────────────────────────

    /// Rebuild the user's index from their full upstream history.
    ///
    /// Returns the number of entries stored, or `None` if another import
    /// holds the lease. Upstream errors abort the run, leave the previous
    /// entries in place and are surfaced under the import flag.
    pub async fn import_entries(&self, session: &StravaSession) -> Result<Option<usize>> {
        let user_id = session.user_id();

        if !self.acquire_lease(user_id).await? {
            tracing::info!(user_id, "Import already in progress");
            return Ok(None);
        }

        tracing::info!(user_id, "Starting index import");

        let mut summaries = Vec::new();
        let mut seen = 0u32;
        let mut pages = Box::pin(list_all_activities(session, self.page_size));

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(user_id, fetched = seen, error = %e, "Index import aborted");
                    self.fail_import(user_id, &e).await;
                    return Err(e);
                }
            };

            seen += page.len() as u32;
            summaries.extend(page.iter().filter_map(|a| a.to_summary()));
            self.set_flag(user_id, &ImportProgress::running(seen), self.import_flag_ttl)
                .await;
        }

        if let Err(e) = self.store.replace_user_summaries(user_id, &summaries).await {
            tracing::error!(
                user_id,
                count = summaries.len(),
                error = %e,
                "Failed to store index, dropping batch"
            );
            self.fail_import(user_id, &e).await;
            return Err(e);
        }

        self.touch(user_id).await;
        if let Err(e) = self.hot.delete(&keys::import_flag(user_id)).await {
            tracing::warn!(user_id, error = %e, "Failed to clear import flag");
        }

        tracing::info!(
            user_id,
            fetched = seen,
            stored = summaries.len(),
            "Index import complete"
        );
        Ok(Some(summaries.len()))
    }

    // ─── Queries ─────────────────────────────────────────────────

    async fn touch(&self, user_id: u64) {
        if let Err(e) = self.store.touch_user(user_id, Utc::now().timestamp()).await {
            tracing::warn!(user_id, error = %e, "Failed to record index access");
        }
    }

    /// Matching entries, newest first, truncated to `filter.limit`.
    pub async fn query(&self, filter: &SummaryFilter) -> Result<Vec<ActivitySummary>> {
        let mut found = self.store.find_summaries(filter).await?;
        found.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
        if filter.limit > 0 {
            found.truncate(filter.limit);
        }

        if let Some(user_id) = filter.user_id {
            self.touch(user_id).await;
        }
        Ok(found)
    }

    /// Difference between the ids a caller holds and the current result of
    /// `filter`: what to drop and what to fetch.
    pub async fn reconcile(
        &self,
        filter: &SummaryFilter,
        held: &HashSet<u64>,
    ) -> Result<Reconciliation> {
        let current = self.query(filter).await?;
        let current_ids: HashSet<u64> = current.iter().map(|s| s.id).collect();

        let mut delete: Vec<u64> = held.difference(&current_ids).copied().collect();
        delete.sort_unstable();
        let fetch = current
            .into_iter()
            .filter(|s| !held.contains(&s.id))
            .collect();

        Ok(Reconciliation { delete, fetch })
    }

    // ─── Single-record maintenance ───────────────────────────────

    /// Index one activity by id. Returns false if upstream no longer has it
    /// or it has no route to index.
    pub async fn import_one(&self, session: &StravaSession, activity_id: u64) -> Result<bool> {
        let user_id = session.user_id();
        let Some(activity) = session.get_activity(activity_id).await? else {
            tracing::info!(user_id, activity_id, "Activity not found upstream");
            return Ok(false);
        };

        if activity.athlete.id != user_id {
            return Err(AppError::BadRequest(format!(
                "Activity {} does not belong to user {}",
                activity_id, user_id
            )));
        }

        let Some(summary) = activity.to_summary() else {
            tracing::debug!(user_id, activity_id, "Activity has no route, not indexed");
            return Ok(false);
        };

        self.store.upsert_summaries(&[summary]).await?;
        tracing::info!(user_id, activity_id, "Indexed activity");
        Ok(true)
    }

    /// Apply metadata changes to an existing entry. Returns false if the
    /// activity is not indexed.
    pub async fn update_one(&self, activity_id: u64, updates: &ActivityUpdates) -> Result<bool> {
        if updates.is_empty() {
            return Ok(false);
        }

        let Some(mut summary) = self.store.get_summary(activity_id).await? else {
            tracing::debug!(activity_id, "Update for unindexed activity ignored");
            return Ok(false);
        };

        updates.apply(&mut summary);
        self.store.upsert_summaries(&[summary]).await?;
        tracing::info!(activity_id, "Updated index entry");
        Ok(true)
    }

    pub async fn delete_one(&self, activity_id: u64) -> Result<bool> {
        let deleted = self.store.delete_summaries(&[activity_id]).await? > 0;
        if deleted {
            tracing::info!(activity_id, "Deleted index entry");
        }
        Ok(deleted)
    }

    // ─── Retention ───────────────────────────────────────────────

    /// Evict every entry of users idle for longer than the retention window.
    ///
    /// Per-user failures are counted and the sweep continues.
    pub async fn triage(&self) -> Result<TriageStats> {
        let cutoff = Utc::now().timestamp() - self.retention.as_secs() as i64;
        let users = self.store.stale_users(cutoff).await?;
        let mut stats = TriageStats::default();

        for user_id in users {
            let evicted = async {
                let deleted = self.store.delete_user_summaries(user_id).await?;
                self.store.delete_user_access(user_id).await?;
                Ok::<_, AppError>(deleted)
            }
            .await;

            match evicted {
                Ok(deleted) => {
                    stats.users += 1;
                    stats.deleted += deleted as u32;
                    tracing::debug!(user_id, deleted, "Evicted idle user index");
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(user_id, error = %e, "Failed to evict idle user index");
                }
            }
        }

        tracing::info!(
            users = stats.users,
            deleted = stats.deleted,
            errors = stats.errors,
            "Index triage complete"
        );
        Ok(stats)
    }
}

/// User-visible text stored under the import flag after a failure.
fn import_error_message(error: &AppError) -> String {
    match error {
        AppError::RateLimited => "Strava rate limit reached, please retry later".to_string(),
        AppError::TokenRevoked(_) => "Strava authorization expired, please reconnect".to_string(),
        AppError::Database(_) => "Could not save activity index".to_string(),
        _ => "Error importing activities from Strava".to_string(),
    }
}
