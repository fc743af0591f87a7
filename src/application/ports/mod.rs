//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_probe;
mod audio_storage;
mod synthesis_cache;
mod tts_engine;
mod voice_catalog;

pub use audio_probe::{AudioProbePort, ProbeError};
pub use audio_storage::{AudioStorageError, AudioStoragePort, PurgeResult};
pub use synthesis_cache::{
    fingerprint, generate_cache_key, CacheEntry, CacheError, CacheStats, CachedSynthesis,
    SynthesisCachePort, CACHE_KEY_PREFIX,
};
pub use tts_engine::{AudioStream, TtsEnginePort, TtsError};
pub use voice_catalog::{CatalogSource, VoiceCatalogPort};
