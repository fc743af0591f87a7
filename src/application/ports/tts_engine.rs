//! TTS Engine Port - 流式合成引擎抽象
//!
//! 定义向服务商发起一次合成并按到达顺序拉取音频块的接口，
//! 具体实现在 infrastructure/adapters/tts

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::domain::synthesis::SynthesisRequest;

/// TTS 错误
#[derive(Debug, Error)]
pub enum TtsError {
    /// 协议帧无法解析，不重试
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// 服务商明确拒绝了请求
    #[error("Provider error {code}: {message}")]
    Provider { code: u32, message: String },

    /// 未收到终止块就结束（超时或连接断开）
    #[error("Synthesis incomplete: {0}")]
    Incomplete(String),

    /// 建立连接或发送请求失败
    #[error("Connection error: {0}")]
    Connection(String),
}

/// 音频块流
///
/// 拉取式，与连接生命周期绑定：丢弃即关闭连接
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, TtsError>> + Send>>;

/// TTS Engine Port
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    /// 发起一次流式合成
    ///
    /// 每次调用建立独立连接；流在收到终止块后正常结束，
    /// 在此之前结束则产出 `TtsError::Incomplete`
    async fn stream(&self, request: &SynthesisRequest) -> Result<AudioStream, TtsError>;

    /// 检查服务商是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
