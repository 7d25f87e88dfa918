// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connected store handles shared by the index, the streams cache and the
//! HTTP surface.

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::{HotCache, MemoryCache, ValkeyCache};
use crate::config::Config;
use crate::db::{collections, FirestoreStore, IndexSetting, MemoryStore, WarmStore};
use crate::error::Result;
use crate::index::SummaryIndex;
use crate::streams::StreamsCache;
use crate::strava::{Credential, StravaClient, StravaSession};

/// Explicitly connected application context.
///
/// Built once with [`Context::connect`], passed down by reference, and torn
/// down with [`Context::disconnect`].
pub struct Context {
    pub config: Config,
    pub strava: StravaClient,
    hot: Arc<dyn HotCache>,
    store: Arc<dyn WarmStore>,
    index: SummaryIndex,
    streams: StreamsCache,
    /// Known user credentials, kept current across refreshes
    credentials: DashMap<u64, Credential>,
    valkey: Option<ValkeyCache>,
}

impl Context {
    /// Connect both tiers as configured and reconcile store settings.
    pub async fn connect(config: Config) -> Result<Self> {
        let (hot, valkey): (Arc<dyn HotCache>, Option<ValkeyCache>) = match &config.redis_url {
            Some(url) => {
                let cache = ValkeyCache::connect(url, config.redis_pool_size).await?;
                (Arc::new(cache.clone()), Some(cache))
            }
            None => {
                tracing::info!("Using in-process hot tier");
                (Arc::new(MemoryCache::new()), None)
            }
        };

        let store: Arc<dyn WarmStore> = if config.memory_store {
            tracing::info!("Using in-process warm tier");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FirestoreStore::new(&config.gcp_project_id).await?)
        };

        let mut context = Self::from_parts(config, hot, store).await?;
        context.valkey = valkey;
        Ok(context)
    }

    /// Build a context over already-connected tiers.
    pub async fn from_parts(
        config: Config,
        hot: Arc<dyn HotCache>,
        store: Arc<dyn WarmStore>,
    ) -> Result<Self> {
        let strava = StravaClient::new(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
        )
        .with_base_url(config.strava_base_url.clone());

        let context = Self {
            index: SummaryIndex::new(store.clone(), hot.clone(), &config),
            streams: StreamsCache::new(hot.clone(), store.clone(), &config),
            strava,
            hot,
            store,
            credentials: DashMap::new(),
            valkey: None,
            config,
        };
        context.reconcile_indexes().await?;
        Ok(context)
    }

    /// Wait for running imports to commit, then release connections.
    pub async fn disconnect(&self) {
        self.streams.shutdown().await;
        if let Some(valkey) = &self.valkey {
            valkey.close();
        }
        tracing::info!("Context disconnected");
    }

    pub fn index(&self) -> &SummaryIndex {
        &self.index
    }

    pub fn streams(&self) -> &StreamsCache {
        &self.streams
    }

    pub fn hot(&self) -> &Arc<dyn HotCache> {
        &self.hot
    }

    pub fn store(&self) -> &Arc<dyn WarmStore> {
        &self.store
    }

    /// TTL settings the warm tier must carry.
    fn desired_index_settings(&self) -> Vec<IndexSetting> {
        vec![IndexSetting::new(
            collections::STREAMS,
            "ts",
            self.config.warm_ttl.as_secs(),
        )]
    }

    /// Compare the store's index listing with the configuration and rewrite
    /// drifted or missing entries. Returns how many were written.
    pub async fn reconcile_indexes(&self) -> Result<usize> {
        let current = self.store.list_index_settings().await?;
        let mut written = 0;

        for wanted in self.desired_index_settings() {
            match current.iter().find(|s| s.key() == wanted.key()) {
                Some(existing) if *existing == wanted => continue,
                Some(existing) => tracing::warn!(
                    setting = %wanted.key(),
                    current = existing.expire_after_secs,
                    wanted = wanted.expire_after_secs,
                    "Index setting drifted, updating"
                ),
                None => tracing::info!(setting = %wanted.key(), "Creating index setting"),
            }
            self.store.put_index_setting(&wanted).await?;
            written += 1;
        }

        Ok(written)
    }

    // ─── Credentials ─────────────────────────────────────────────

    /// Remember a user's credential for webhook-driven imports.
    pub fn register_credential(&self, user_id: u64, credential: Credential) {
        self.credentials.insert(user_id, credential);
    }

    pub fn forget_credential(&self, user_id: u64) {
        self.credentials.remove(&user_id);
    }

    /// Session for a known user, if any credential is registered.
    pub fn session_for(&self, user_id: u64) -> Option<Arc<StravaSession>> {
        let credential = self.credentials.get(&user_id)?.clone();
        Some(Arc::new(StravaSession::new(
            self.strava.clone(),
            user_id,
            credential,
        )))
    }

    /// Keep the stored credential in step with a refresh done by `session`.
    pub async fn save_session(&self, session: &StravaSession) {
        let credential = session.credential().await;
        let user_id = session.user_id();
        if let Some(mut stored) = self.credentials.get_mut(&user_id) {
            if *stored != credential {
                tracing::debug!(user_id, "Storing refreshed credential");
                *stored = credential;
            }
        }
    }

    // ─── Maintenance ─────────────────────────────────────────────

    /// One maintenance pass: index triage, then expired streams purge in
    /// both tiers.
    pub async fn run_maintenance(&self) {
        if let Err(e) = self.index.triage().await {
            tracing::error!(error = %e, "Index triage failed");
        }
        match self.store.purge_expired().await {
            Ok(purged) => tracing::debug!(purged, "Expired streams purged"),
            Err(e) => tracing::warn!(error = %e, "Streams purge failed"),
        }
        match self.hot.purge_expired().await {
            Ok(purged) => tracing::debug!(purged, "Expired hot entries purged"),
            Err(e) => tracing::warn!(error = %e, "Hot tier purge failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn context(store: MemoryStore, config: Config) -> Context {
        Context::from_parts(config, Arc::new(MemoryCache::new()), Arc::new(store))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reconcile_creates_then_is_idempotent() {
        let store = MemoryStore::new();
        let ctx = context(store.clone(), Config::test_default()).await;

        // from_parts already reconciled once
        assert_eq!(ctx.reconcile_indexes().await.unwrap(), 0);
        let settings = store.list_index_settings().await.unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(
            settings[0].expire_after_secs,
            Config::test_default().warm_ttl.as_secs()
        );
    }

    #[tokio::test]
    async fn test_reconcile_fixes_drift() {
        let store = MemoryStore::new();
        store
            .put_index_setting(&IndexSetting::new(collections::STREAMS, "ts", 60))
            .await
            .unwrap();

        let mut config = Config::test_default();
        config.warm_ttl = Duration::from_secs(7200);
        context(store.clone(), config).await;

        let settings = store.list_index_settings().await.unwrap();
        assert_eq!(settings[0].expire_after_secs, 7200);
    }

    #[tokio::test]
    async fn test_session_for_registered_user_only() {
        let ctx = context(MemoryStore::new(), Config::test_default()).await;
        assert!(ctx.session_for(5).is_none());

        ctx.register_credential(
            5,
            Credential {
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                expires_at: 0,
            },
        );
        let session = ctx.session_for(5).unwrap();
        assert_eq!(session.user_id(), 5);

        ctx.forget_credential(5);
        assert!(ctx.session_for(5).is_none());
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_hot_tier() {
        let hot = MemoryCache::new();
        let ctx = Context::from_parts(
            Config::test_default(),
            Arc::new(hot.clone()),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();

        hot.set("stream:1", b"blob", Duration::from_millis(10))
            .await
            .unwrap();
        hot.set("import-flag:3", b"{}", Duration::from_millis(10))
            .await
            .unwrap();
        hot.set("stream:2", b"blob", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        ctx.run_maintenance().await;
        assert_eq!(hot.len(), 1);
        assert!(hot.get("stream:2").await.unwrap().is_some());
    }
}
