//! Synthesize Commands

use crate::domain::synthesis::SynthesisRequest;

/// 合成命令（完整编排：缓存、持久化、元数据）
#[derive(Debug, Clone)]
pub struct SynthesizeCommand {
    /// 已校验的合成请求
    pub request: SynthesisRequest,
    /// 调用方身份，仅用于审计日志
    pub caller_id: Option<String>,
}

impl SynthesizeCommand {
    pub fn new(request: SynthesisRequest) -> Self {
        Self {
            request,
            caller_id: None,
        }
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }
}

/// 流式合成命令（绕过缓存，持久化由调用方负责）
#[derive(Debug, Clone)]
pub struct SynthesizeStreamCommand {
    pub request: SynthesisRequest,
}
