//! Voice Catalog Port - 音色目录与情感能力

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::catalog::VoiceCatalog;

/// 目录快照的来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// 从配置文档加载
    Document(PathBuf),
    /// 文档缺失或无法解析，使用内置默认值（降级模式）
    Fallback,
}

/// Voice Catalog Port
///
/// 查询只看到完整的快照；重新加载整体替换快照，不做原地修改
pub trait VoiceCatalogPort: Send + Sync {
    /// 当前快照
    fn snapshot(&self) -> Arc<VoiceCatalog>;

    /// 重新读取配置文档，可与查询并发调用
    fn reload(&self) -> CatalogSource;

    /// 音色是否支持情感参数
    fn supports_emotion(&self, voice_id: &str) -> bool {
        self.snapshot().supports_emotion(voice_id)
    }
}
