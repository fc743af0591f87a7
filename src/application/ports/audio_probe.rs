//! Audio Probe Port - 音频时长探测

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::domain::synthesis::AudioEncoding;

/// 探测错误
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Unsupported audio: {0}")]
    Unsupported(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Audio Probe Port
///
/// 探测失败不是致命错误，调用方将时长记为缺失
#[async_trait]
pub trait AudioProbePort: Send + Sync {
    /// 返回音频时长（秒）
    ///
    /// `sample_rate` 只用于没有容器头的裸 PCM
    async fn duration(
        &self,
        path: &Path,
        encoding: AudioEncoding,
        sample_rate: u32,
    ) -> Result<f64, ProbeError>;
}
