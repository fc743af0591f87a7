//! Persistence Layer - 数据持久化
//!
//! Sled 存储实现，以及按配置选择缓存后端

pub mod sled;

use std::sync::Arc;

use crate::application::ports::SynthesisCachePort;
use crate::config::{CacheBackend, CacheConfig};
use crate::infrastructure::memory::InMemorySynthesisCache;

pub use self::sled::{SledCacheConfig, SledSynthesisCache};

/// 按配置创建合成缓存
///
/// Sled 打不开（路径不可写、数据库被占用或损坏）时降级为内存缓存，
/// 缓存故障不阻止合成
pub fn open_synthesis_cache(config: &CacheConfig) -> Arc<dyn SynthesisCachePort> {
    match config.backend {
        CacheBackend::Memory => Arc::new(InMemorySynthesisCache::new(config.max_entries)),
        CacheBackend::Sled => match open_sled(config) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(
                    sled_path = %config.sled_path.display(),
                    error = %e,
                    "Sled cache unavailable, falling back to in-memory cache"
                );
                Arc::new(InMemorySynthesisCache::new(config.max_entries))
            }
        },
    }
}

fn open_sled(config: &CacheConfig) -> Result<SledSynthesisCache, String> {
    if let Some(parent) = config.sled_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }
    SledSynthesisCache::open(&config.sled_path).map_err(|e| e.to_string())
}
