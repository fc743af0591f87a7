//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（TtsEngine、SynthesisCache、AudioStorage、VoiceCatalog 等）
//! - commands: CQRS 命令及处理器（合成、目录重载）
//! - queries: CQRS 查询及处理器（音色目录、缓存统计）
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    handlers::{
        ReloadVoicesHandler, ReloadVoicesResponse, SynthesisStream, SynthesizeHandler,
        SynthesizeOptions, SynthesizeStreamHandler,
    },
    ReloadVoices, SynthesizeCommand, SynthesizeStreamCommand,
};

pub use error::SynthesisError;

pub use ports::{
    fingerprint, generate_cache_key, AudioProbePort, AudioStorageError, AudioStoragePort,
    AudioStream, CacheEntry, CacheError, CacheStats, CachedSynthesis, CatalogSource, ProbeError,
    PurgeResult, SynthesisCachePort, TtsEnginePort, TtsError, VoiceCatalogPort,
};

pub use queries::{
    handlers::{
        GetCacheStatsHandler, GetVoiceHandler, ListVoicesHandler, VoiceDetailResponse,
        VoiceListResponse,
    },
    GetCacheStats, GetVoice, ListVoices,
};
