//! Synthesis Cache Port - 合成结果缓存
//!
//! 缓存的是合成结果的元数据（不含存储路径），具体实现有内存与 Sled 两种

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::synthesis::{AudioEncoding, SynthesisRequest};

/// 合成缓存 key 前缀
pub const CACHE_KEY_PREFIX: &str = "tts";

/// Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// 缓存的合成元数据
///
/// 不包含文件路径：路径与调用方、请求相关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSynthesis {
    pub voice_id: String,
    pub format: AudioEncoding,
    pub file_size: u64,
    pub duration: Option<f64>,
    pub synthesis_time: f64,
}

/// 缓存条目
///
/// 只会整体替换，不做字段级更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedSynthesis,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: CachedSynthesis, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key: key.into(),
            value,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Synthesis Cache Port
///
/// - 过期条目在读取时视为不存在，并顺带删除
/// - `set` 整体替换已有条目
/// - `sweep` 主动清理过期条目，只是优化，读取本身已保证不返回过期数据
#[async_trait]
pub trait SynthesisCachePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, value: CachedSynthesis, ttl: Duration) -> Result<(), CacheError>;

    /// 返回是否确实删除了条目
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// 返回清理的条目数
    async fn sweep(&self) -> Result<usize, CacheError>;

    async fn stats(&self) -> CacheStats;
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 生成缓存 key
///
/// 参数按名称排序后编码为 JSON 对象再取 md5，与参数传入顺序无关；
/// 值中出现的分隔字符经 JSON 转义，不会让不同参数集拼出相同的输入
pub fn generate_cache_key<K, V>(prefix: &str, params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: Into<String>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    let mut context = md5::Context::new();
    context.consume(prefix.as_bytes());
    context.consume([0u8]);
    // BTreeMap<String, String> 的序列化不会失败
    if let Ok(encoded) = serde_json::to_vec(&sorted) {
        context.consume(&encoded);
    }

    format!("{}:{:x}", prefix, context.compute())
}

/// 合成请求指纹
pub fn fingerprint(request: &SynthesisRequest) -> String {
    generate_cache_key(CACHE_KEY_PREFIX, request.fingerprint_params())
}
