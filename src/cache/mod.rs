// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hot tier: low-latency, TTL-bounded blob cache.
//!
//! Entries here are pure copies of warm-tier data (or ephemeral leases), so
//! losing the hot tier only costs latency.

pub mod memory;
pub mod valkey;

pub use memory::MemoryCache;
pub use valkey::ValkeyCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key namespaces, one prefix per logical dataset.
pub mod keys {
    pub const IMPORT_FLAG_PREFIX: &str = "import-flag:";
    pub const STREAM_PREFIX: &str = "stream:";

    pub fn import_flag(user_id: u64) -> String {
        format!("{}{}", IMPORT_FLAG_PREFIX, user_id)
    }

    pub fn stream(activity_id: u64) -> String {
        format!("{}{}", STREAM_PREFIX, activity_id)
    }
}

/// Batched get/set/delete over opaque byte values.
///
/// Batch operations are pipelined; backends apply each batch atomically
/// where they can.
#[async_trait]
pub trait HotCache: Send + Sync {
    /// Values for `keys`, positionally aligned; `None` for misses.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> Result<()>;

    /// Reset the expiry of existing keys; missing keys are ignored.
    async fn expire_many(&self, keys: &[String], ttl: Duration) -> Result<()>;

    /// Returns the number of keys that existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64>;

    /// Store `value` only if `key` holds no live entry. Returns whether the
    /// value was stored.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Drop expired entries. Backends that expire keys on their own report 0.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut values = self.get_many(&[key.to_string()]).await?;
        Ok(values.pop().flatten())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.set_many(&[(key.to_string(), value.to_vec())], ttl)
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.delete_many(&[key.to_string()]).await? > 0)
    }
}
