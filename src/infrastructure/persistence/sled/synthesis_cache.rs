//! Sled-based Synthesis Cache Implementation
//!
//! 进程重启后缓存仍然有效；过期在读取时判断

use async_trait::async_trait;
use chrono::Utc;
use sled::Db;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::application::ports::{
    CacheEntry, CacheError, CacheStats, CachedSynthesis, SynthesisCachePort,
};

const KEY_PREFIX: &str = "cache:";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache.sled".to_string(),
        }
    }
}

fn db_err(e: sled::Error) -> CacheError {
    CacheError::DatabaseError(e.to_string())
}

/// Sled 合成缓存
pub struct SledSynthesisCache {
    db: Db,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    set_count: AtomicU64,
    delete_count: AtomicU64,
}

impl SledSynthesisCache {
    /// 创建新的缓存实例
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.db_path).map_err(db_err)?;

        tracing::info!(
            db_path = %config.db_path,
            entries = db.scan_prefix(KEY_PREFIX).count(),
            "SledSynthesisCache initialized"
        );

        Ok(Self {
            db,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
        })
    }

    /// 打开现有缓存
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let config = SledCacheConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
        };
        Self::new(&config)
    }

    fn decode(data: &[u8]) -> Result<CacheEntry, CacheError> {
        bincode::deserialize(data).map_err(|e| CacheError::SerializationError(e.to_string()))
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush().map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl SynthesisCachePort for SledSynthesisCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let db_key = format!("{}{}", KEY_PREFIX, key);

        let data = match self.db.get(&db_key).map_err(db_err)? {
            Some(data) => data,
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        let entry = match Self::decode(&data) {
            Ok(entry) => entry,
            Err(e) => {
                // 无法解析的旧条目直接丢弃
                tracing::warn!(cache_key = %key, error = %e, "Dropping undecodable cache entry");
                self.db.remove(&db_key).map_err(db_err)?;
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        if entry.is_expired() {
            self.db.remove(&db_key).map_err(db_err)?;
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    async fn set(&self, key: &str, value: CachedSynthesis, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, value, ttl);
        let entry_bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        self.db
            .insert(format!("{}{}", KEY_PREFIX, key), entry_bytes)
            .map_err(db_err)?;
        self.set_count.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(cache_key = %key, expires_at = %entry.expires_at, "Synthesis cached");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self
            .db
            .remove(format!("{}{}", KEY_PREFIX, key))
            .map_err(db_err)?
            .is_some();
        if removed {
            self.delete_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn sweep(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut removed = 0;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(db_err)?;
            let expired = Self::decode(&value).map_or(true, |entry| entry.is_expired_at(now));
            if expired {
                self.db.remove(&key).map_err(db_err)?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired cache entries");
        }
        Ok(removed)
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            backend: "sled",
            entries: self.db.scan_prefix(KEY_PREFIX).count(),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            sets: self.set_count.load(Ordering::Relaxed),
            deletes: self.delete_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::synthesis::AudioEncoding;
    use tempfile::tempdir;

    fn value() -> CachedSynthesis {
        CachedSynthesis {
            voice_id: "v1".to_string(),
            format: AudioEncoding::Mp3,
            file_size: 1024,
            duration: Some(2.5),
            synthesis_time: 0.8,
        }
    }

    fn cache(dir: &Path) -> SledSynthesisCache {
        SledSynthesisCache::open(dir.join("test.sled")).unwrap()
    }

    #[tokio::test]
    async fn test_cache_set_get_delete() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());

        assert!(cache.get("tts:k").await.unwrap().is_none());

        cache.set("tts:k", value(), Duration::from_secs(60)).await.unwrap();
        let entry = cache.get("tts:k").await.unwrap().unwrap();
        assert_eq!(entry.value, value());

        assert!(cache.delete("tts:k").await.unwrap());
        assert!(!cache.delete("tts:k").await.unwrap());

        let stats = cache.stats().await;
        assert_eq!(stats.backend, "sled");
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());

        cache.set("tts:k", value(), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(cache.get("tts:k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(cache.get("tts:k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = cache(dir.path());
            cache.set("tts:k", value(), Duration::from_secs(60)).await.unwrap();
            cache.flush().unwrap();
        }
        let cache = cache(dir.path());
        assert!(cache.get("tts:k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let dir = tempdir().unwrap();
        let cache = cache(dir.path());

        cache.set("tts:short", value(), Duration::ZERO).await.unwrap();
        cache.set("tts:long", value(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.sweep().await.unwrap(), 1);
        assert_eq!(cache.stats().await.entries, 1);
    }
}
