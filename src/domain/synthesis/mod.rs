//! Synthesis Context - 合成限界上下文
//!
//! 职责:
//! - 合成请求（不可变，构造时校验）
//! - 合成结果
//! - 输出编码

mod errors;
mod result;
mod value_objects;

pub use errors::RequestError;
pub use result::{SynthesisResult, SynthesisStatus};
pub use value_objects::{
    AudioEncoding, SynthesisRequest, SynthesisRequestBuilder, DEFAULT_BITRATE_KBPS,
    DEFAULT_MAX_TEXT_LENGTH, DEFAULT_SAMPLE_RATE, NEUTRAL_EMOTION, SUPPORTED_SAMPLE_RATES,
};
