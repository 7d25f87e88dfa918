// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process hot tier used in tests and when no Redis URL is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use super::HotCache;
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// DashMap-backed cache with lazy expiry.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    data: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining lifetime of a key, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.data
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }
}

#[async_trait]
impl HotCache for MemoryCache {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let now = Instant::now();
        let values = keys
            .iter()
            .map(|key| {
                let value = self
                    .data
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| e.value.clone());
                if value.is_none() {
                    self.data.remove_if(key, |_, e| !e.is_live(now));
                }
                value
            })
            .collect();
        Ok(values)
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.data.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn expire_many(&self, keys: &[String], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        for key in keys {
            if let Some(mut entry) = self.data.get_mut(key) {
                if entry.is_live(now) {
                    entry.expires_at = now + ttl;
                }
            }
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.data.remove(key))
            .filter(|(_, e)| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_vec(),
            expires_at: now + ttl,
        };
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(existing) if existing.get().is_live(now) => Ok(false),
            MapEntry::Occupied(mut existing) => {
                existing.insert(entry);
                Ok(true)
            }
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, e| e.is_live(now));
        Ok(before.saturating_sub(self.data.len()) as u64)
    }
}
