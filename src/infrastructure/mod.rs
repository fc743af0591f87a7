//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod catalog;
pub mod memory;
pub mod persistence;
pub mod worker;

pub use adapters::{FileAudioStorage, SymphoniaProbe, VolcanoClientConfig, VolcanoTtsClient};
pub use catalog::VoiceCatalogRegistry;
pub use memory::InMemorySynthesisCache;
pub use persistence::{open_synthesis_cache, SledCacheConfig, SledSynthesisCache};
pub use worker::{CacheSweeper, CacheSweeperConfig};
