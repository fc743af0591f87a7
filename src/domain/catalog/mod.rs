//! Catalog Context - 音色目录限界上下文
//!
//! 职责:
//! - 音色分类与音色信息
//! - 情感能力查询
//! - 音色过滤

mod voice_catalog;

pub use voice_catalog::{
    default_emotion_voices, VoiceCatalog, VoiceCategory, VoiceFilter, VoiceInfo,
};
