//! Audio Storage Port - 出站端口
//!
//! 定义合成音频的持久化、内容保留与过期清理接口

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::synthesis::AudioEncoding;

/// 音频存储错误
#[derive(Debug, Error)]
pub enum AudioStorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 过期清理结果
#[derive(Debug, Clone, Default)]
pub struct PurgeResult {
    /// 删除的文件数量
    pub deleted_files: u64,
    /// 释放的空间（字节）
    pub freed_bytes: u64,
}

/// Audio Storage Port - 出站端口
#[async_trait]
pub trait AudioStoragePort: Send + Sync {
    /// 请求对应的输出位置，由请求 ID 和编码决定
    fn audio_path(&self, request_id: Uuid, encoding: AudioEncoding) -> PathBuf;

    /// 存储位置对应的公开 URL
    fn public_url(&self, path: &Path) -> String;

    /// 保存音频数据
    ///
    /// 全有或全无：先写临时文件再原子替换，失败时不留下部分文件
    async fn save_audio(&self, path: &Path, data: &[u8]) -> Result<u64, AudioStorageError>;

    /// 按缓存 key 保留一份内容副本，供缓存命中时复用
    async fn retain(&self, key: &str, source: &Path) -> Result<(), AudioStorageError>;

    /// 把保留的内容放到新的存储位置
    ///
    /// 返回 false 表示该 key 没有保留内容
    async fn restore(
        &self,
        key: &str,
        encoding: AudioEncoding,
        dest: &Path,
    ) -> Result<bool, AudioStorageError>;

    /// 删除音频文件（不存在时不报错）
    async fn delete_audio(&self, path: &Path) -> Result<(), AudioStorageError>;

    /// 删除超过保留时长的音频文件
    async fn purge_older_than(&self, max_age: Duration) -> Result<PurgeResult, AudioStorageError>;
}
