// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Valkey/Redis hot tier.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};

use super::HotCache;
use crate::error::{AppError, Result};

/// Pooled Valkey/Redis connection.
#[derive(Clone)]
pub struct ValkeyCache {
    pool: Pool,
}

impl ValkeyCache {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self> {
        let pool = Config::from_url(url)
            .builder()
            .map_err(|e| AppError::Cache(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| AppError::Cache(e.to_string()))?;

        let cache = Self { pool };
        let mut conn = cache.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(format!("PING failed: {}", e)))?;

        tracing::info!("Connected to hot cache");
        Ok(cache)
    }

    /// Stop handing out connections; in-flight ones finish normally.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl HotCache for ValkeyCache {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let secs = ttl_secs(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SETEX")
                .arg(key)
                .arg(secs)
                .arg(value.as_slice())
                .ignore();
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }

    async fn expire_many(&self, keys: &[String], ttl: Duration) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let secs = ttl_secs(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in keys {
            pipe.cmd("EXPIRE").arg(key).arg(secs).ignore();
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<u64>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<Option<String>>(&mut *conn)
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;
        Ok(reply.is_some())
    }
}
