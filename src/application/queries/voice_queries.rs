//! Voice Queries

use crate::domain::catalog::VoiceFilter;

/// 获取单个音色详情
#[derive(Debug, Clone)]
pub struct GetVoice {
    pub voice_id: String,
}

/// 按条件列出音色
#[derive(Debug, Clone, Default)]
pub struct ListVoices {
    pub filter: VoiceFilter,
}
