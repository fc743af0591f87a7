//! In-Memory Synthesis Cache Implementation

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::application::ports::{
    CacheEntry, CacheError, CacheStats, CachedSynthesis, SynthesisCachePort,
};

/// 内存合成缓存
///
/// 条目数超过上限时先清理过期条目，仍然超限则淘汰最早过期的条目
pub struct InMemorySynthesisCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    set_count: AtomicU64,
    delete_count: AtomicU64,
}

impl InMemorySynthesisCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        }
    }

    fn remove_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_soonest_expiring(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            tracing::debug!(cache_key = %key, "Evicted cache entry");
        }
    }
}

impl Default for InMemorySynthesisCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl SynthesisCachePort for InMemorySynthesisCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.entries.get(key).map(|e| e.clone());

        match entry {
            Some(entry) if !entry.is_expired() => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry))
            }
            Some(_) => {
                // 只删除仍然过期的条目，避免误删并发写入的新值
                self.entries.remove_if(key, |_, e| e.is_expired());
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: CachedSynthesis, ttl: Duration) -> Result<(), CacheError> {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.remove_expired();
            while self.entries.len() >= self.max_entries {
                self.evict_soonest_expiring();
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl));
        self.set_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn sweep(&self) -> Result<usize, CacheError> {
        Ok(self.remove_expired())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            backend: "memory",
            entries: self.entries.len(),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.delete_count.load(Ordering::Relaxed),
        }
    }
}
