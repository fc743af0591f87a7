//! Sled 持久化缓存

mod synthesis_cache;

pub use synthesis_cache::{SledCacheConfig, SledSynthesisCache};
