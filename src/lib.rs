//! Volcano TTS - 火山引擎语音合成管线
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Synthesis Context: 合成请求与结果
//! - Catalog Context: 音色目录与情感能力
//!
//! 应用层 (application/):
//! - Ports: 端口定义（TtsEngine, SynthesisCache, AudioStorage, AudioProbe, VoiceCatalog）
//! - Commands: 合成编排、流式合成、目录重载
//! - Queries: 音色查询、缓存统计
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: 二进制帧编解码 + WebSocket 客户端、文件存储、时长探测
//! - Catalog: 音色配置文档加载
//! - Memory / Persistence: 内存与 Sled 合成缓存
//! - Worker: CacheSweeper 后台清理

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
