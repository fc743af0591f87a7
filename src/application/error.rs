//! 应用层错误定义
//!
//! 合成调用对外暴露的统一错误类型

use thiserror::Error;

use crate::application::ports::{AudioStorageError, CacheError, TtsError};
use crate::domain::synthesis::RequestError;

/// 合成错误
///
/// 核心内部不做自动重试，重试策略由调用层决定
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// 协议解码失败，不重试
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// 服务商拒绝了请求，原样返回给调用方
    #[error("Provider error {code}: {message}")]
    ProviderError { code: u32, message: String },

    /// 流在终止块之前结束，调用方可整体重试；部分音频已丢弃
    #[error("Synthesis incomplete: {0}")]
    SynthesisIncomplete(String),

    /// 持久化或编排过程中的底层失败
    #[error("Synthesis failed: {cause}")]
    SynthesisFailed { cause: String },

    /// 缓存子系统故障，合成按未命中继续
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// 请求参数不合法
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },
}

impl SynthesisError {
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self::SynthesisFailed {
            cause: cause.to_string(),
        }
    }

    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 调用方是否可以原样重试整个调用
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SynthesisIncomplete(_))
    }
}

impl From<TtsError> for SynthesisError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::MalformedFrame(msg) => Self::MalformedFrame(msg),
            TtsError::Provider { code, message } => Self::ProviderError { code, message },
            TtsError::Incomplete(msg) => Self::SynthesisIncomplete(msg),
            TtsError::Connection(msg) => Self::failed(format!("connection: {}", msg)),
        }
    }
}

impl From<AudioStorageError> for SynthesisError {
    fn from(err: AudioStorageError) -> Self {
        Self::failed(err)
    }
}

impl From<CacheError> for SynthesisError {
    fn from(err: CacheError) -> Self {
        Self::CacheUnavailable(err.to_string())
    }
}
