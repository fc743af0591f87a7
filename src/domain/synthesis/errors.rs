//! Synthesis Context - Errors

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("文本不能为空")]
    EmptyText,

    #[error("文本长度 {len} 超过上限 {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("音色 ID 不能为空")]
    EmptyVoice,

    #[error("{name} 超出范围 [{min}, {max}]: {value}")]
    RatioOutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("不支持的采样率: {0}")]
    UnsupportedSampleRate(u32),

    #[error("比特率必须大于 0")]
    InvalidBitrate,

    #[error("不支持的音频编码: {0}")]
    UnsupportedEncoding(String),
}
