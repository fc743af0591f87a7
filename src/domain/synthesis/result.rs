//! Synthesis Context - 合成结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::AudioEncoding;

/// 合成完成状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStatus {
    Success,
}

/// 合成结果
///
/// 只由编排器产生；缓存中只保存其中的元数据子集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    /// 每次调用都会生成新的请求 ID（包括缓存命中）
    pub request_id: Uuid,
    pub voice_id: String,
    pub format: AudioEncoding,
    /// 存储位置
    pub file_path: PathBuf,
    /// 公开访问 URL
    pub file_url: String,
    /// 字节数
    pub file_size: u64,
    /// 音频时长（秒），探测失败时为 None
    pub duration: Option<f64>,
    /// 合成耗时（秒）
    pub synthesis_time: f64,
    pub created_at: DateTime<Utc>,
    pub status: SynthesisStatus,
    /// 是否命中缓存
    pub cache_hit: bool,
}
