//! Voice Commands

/// 重新加载音色配置文档
#[derive(Debug, Clone, Default)]
pub struct ReloadVoices;
