//! Voice Catalog Registry
//!
//! 从 `voice_presets_complete.json` 加载音色目录与情感音色表，
//! 文档缺失或无法解析时降级为内置默认值

use arc_swap::ArcSwap;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::application::ports::{CatalogSource, VoiceCatalogPort};
use crate::domain::catalog::{default_emotion_voices, VoiceCatalog, VoiceCategory, VoiceInfo};

/// 音色配置文档文件名
pub const VOICE_PRESETS_FILE: &str = "voice_presets_complete.json";

/// 文档加载错误
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

#[derive(Debug, Deserialize)]
struct CategoryDoc {
    description: String,
    icon: String,
    color: String,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, Default, Deserialize)]
struct EmotionConfigDoc {
    #[serde(default)]
    emotion_voices: Vec<String>,
}

/// 解析配置文档
///
/// 分类顺序与文档中一致；情感音色表为空时使用内置列表
pub fn parse_document(data: &str) -> Result<VoiceCatalog, CatalogLoadError> {
    let doc: Value =
        serde_json::from_str(data).map_err(|e| CatalogLoadError::InvalidDocument(e.to_string()))?;
    let invalid = |e: serde_json::Error| CatalogLoadError::InvalidDocument(e.to_string());

    let mut categories = Vec::new();
    if let Some(entries) = doc.get("voice_categories").and_then(Value::as_object) {
        for (name, info) in entries {
            let info: CategoryDoc = serde_json::from_value(info.clone()).map_err(invalid)?;
            let voices: Vec<VoiceInfo> = match doc.get("voice_presets").and_then(|p| p.get(name)) {
                Some(voices) => serde_json::from_value(voices.clone()).map_err(invalid)?,
                None => Vec::new(),
            };
            categories.push(VoiceCategory {
                name: name.clone(),
                description: info.description,
                icon: info.icon,
                color: info.color,
                special: info.special,
                voices,
            });
        }
    }

    let emotion_config: EmotionConfigDoc = match doc.get("emotion_config") {
        Some(config) => serde_json::from_value(config.clone()).map_err(invalid)?,
        None => EmotionConfigDoc::default(),
    };
    let emotion_voices = if emotion_config.emotion_voices.is_empty() {
        tracing::warn!("No emotion voices in document, using built-in list");
        default_emotion_voices()
    } else {
        emotion_config.emotion_voices
    };

    Ok(VoiceCatalog::new(categories, emotion_voices))
}

/// 配置文档的位置
#[derive(Debug, Clone)]
enum DocumentLocation {
    /// 显式配置的路径
    Fixed(PathBuf),
    /// 每次加载时依次在这些目录中查找
    Search(Vec<PathBuf>),
    /// 只使用内置默认值
    Builtin,
}

/// 音色目录注册表
///
/// 快照整体原子替换，查询不会看到加载到一半的目录
pub struct VoiceCatalogRegistry {
    location: DocumentLocation,
    default_voice: String,
    snapshot: ArcSwap<VoiceCatalog>,
}

impl VoiceCatalogRegistry {
    /// 创建并立即加载；`path` 为 None 时直接使用内置默认值
    pub fn new(path: Option<PathBuf>, default_voice: impl Into<String>) -> Self {
        let location = match path {
            Some(path) => DocumentLocation::Fixed(path),
            None => DocumentLocation::Builtin,
        };
        Self::with_location(location, default_voice.into())
    }

    /// 在当前目录及上两级目录中查找配置文档，每次重新加载都会重新查找
    pub fn discovering(default_voice: impl Into<String>) -> Self {
        let dirs = std::env::current_dir()
            .map(|cwd| cwd.ancestors().take(3).map(Path::to_path_buf).collect())
            .unwrap_or_default();
        Self::with_search_dirs(dirs, default_voice)
    }

    /// 在给定目录中查找配置文档，每次重新加载都会重新查找
    pub fn with_search_dirs(dirs: Vec<PathBuf>, default_voice: impl Into<String>) -> Self {
        Self::with_location(DocumentLocation::Search(dirs), default_voice.into())
    }

    fn with_location(location: DocumentLocation, default_voice: String) -> Self {
        let registry = Self {
            location,
            default_voice,
            snapshot: ArcSwap::from_pointee(VoiceCatalog::default()),
        };
        registry.reload();
        registry
    }

    fn resolve(&self) -> Option<PathBuf> {
        match &self.location {
            DocumentLocation::Fixed(path) => Some(path.clone()),
            DocumentLocation::Search(dirs) => dirs
                .iter()
                .map(|dir| dir.join(VOICE_PRESETS_FILE))
                .find(|path| path.is_file()),
            DocumentLocation::Builtin => None,
        }
    }

    fn fallback(&self) -> (VoiceCatalog, CatalogSource) {
        (
            VoiceCatalog::fallback(&self.default_voice),
            CatalogSource::Fallback,
        )
    }

    fn load(&self) -> (VoiceCatalog, CatalogSource) {
        let Some(path) = self.resolve() else {
            tracing::warn!("Voice presets document not found, using fallback catalog");
            return self.fallback();
        };

        let loaded = std::fs::read_to_string(&path)
            .map_err(|e| CatalogLoadError::IoError(e.to_string()))
            .and_then(|data| parse_document(&data));

        match loaded {
            Ok(catalog) => {
                tracing::info!(
                    path = %path.display(),
                    categories = catalog.categories().len(),
                    voices = catalog.voice_count(),
                    emotion_voices = catalog.emotion_voices().len(),
                    "Voice catalog loaded"
                );
                (catalog, CatalogSource::Document(path))
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load voice presets, using fallback catalog"
                );
                self.fallback()
            }
        }
    }
}

impl VoiceCatalogPort for VoiceCatalogRegistry {
    fn snapshot(&self) -> Arc<VoiceCatalog> {
        self.snapshot.load_full()
    }

    fn reload(&self) -> CatalogSource {
        let (catalog, source) = self.load();
        self.snapshot.store(Arc::new(catalog));
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEFAULT_VOICE: &str = "zh_female_shuangkuaisisi_emo_v2_mars_bigtts";

    const DOCUMENT: &str = r##"{
        "voice_categories": {
            "多情感音色": {"description": "支持情感", "icon": "🎭", "color": "#FF6B6B", "special": true},
            "通用场景": {"description": "日常", "icon": "🎙️", "color": "#4ECDC4"}
        },
        "voice_presets": {
            "多情感音色": [
                {"id": "emo_voice", "name": "情感女声", "description": "d", "category": "多情感音色",
                 "language": "zh-CN", "tags": ["女声"], "emotions": ["happy", "sad"]}
            ],
            "通用场景": [
                {"id": "generic_voice_01", "name": "通用男声", "description": "d", "category": "通用场景",
                 "language": "zh-CN"}
            ]
        },
        "emotion_config": {"emotion_voices": ["emo_voice"]}
    }"##;

    #[test]
    fn test_parse_document_keeps_category_order() {
        let catalog = parse_document(DOCUMENT).unwrap();
        let names: Vec<&str> = catalog.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["多情感音色", "通用场景"]);
        assert_eq!(catalog.voice_count(), 2);
        assert!(catalog.supports_emotion("emo_voice"));
        assert!(!catalog.supports_emotion("generic_voice_01"));
        assert!(catalog.categories()[0].special);
    }

    #[test]
    fn test_missing_document_falls_back() {
        let registry = VoiceCatalogRegistry::new(Some(PathBuf::from("/nonexistent/presets.json")), DEFAULT_VOICE);
        assert!(registry.supports_emotion(DEFAULT_VOICE));
        assert_eq!(registry.snapshot().voice_count(), 1);
        assert_eq!(registry.reload(), CatalogSource::Fallback);
    }

    #[test]
    fn test_unparsable_document_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(VOICE_PRESETS_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let registry = VoiceCatalogRegistry::new(Some(path), DEFAULT_VOICE);
        assert_eq!(registry.reload(), CatalogSource::Fallback);
        assert!(registry.supports_emotion(DEFAULT_VOICE));
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(VOICE_PRESETS_FILE);
        std::fs::write(&path, DOCUMENT).unwrap();

        let registry = VoiceCatalogRegistry::new(Some(path.clone()), DEFAULT_VOICE);
        let before = registry.snapshot();
        assert!(registry.supports_emotion("emo_voice"));

        std::fs::write(
            &path,
            r#"{"voice_categories": {}, "emotion_config": {"emotion_voices": ["other_voice"]}}"#,
        )
        .unwrap();
        assert_eq!(registry.reload(), CatalogSource::Document(path));

        assert!(!registry.supports_emotion("emo_voice"));
        assert!(registry.supports_emotion("other_voice"));
        // 旧快照不受影响
        assert!(before.supports_emotion("emo_voice"));
    }

    #[test]
    fn test_reload_discovers_document_created_later() {
        let dir = tempdir().unwrap();
        let registry =
            VoiceCatalogRegistry::with_search_dirs(vec![dir.path().to_path_buf()], DEFAULT_VOICE);
        assert!(!registry.supports_emotion("emo_voice"));
        assert_eq!(registry.reload(), CatalogSource::Fallback);

        let path = dir.path().join(VOICE_PRESETS_FILE);
        std::fs::write(&path, DOCUMENT).unwrap();
        assert_eq!(registry.reload(), CatalogSource::Document(path));
        assert!(registry.supports_emotion("emo_voice"));
    }

    #[test]
    fn test_concurrent_reload_and_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(VOICE_PRESETS_FILE);
        std::fs::write(&path, DOCUMENT).unwrap();
        let registry = Arc::new(VoiceCatalogRegistry::new(Some(path), DEFAULT_VOICE));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = registry.snapshot();
                        assert_eq!(snapshot.voice_count(), 2);
                        assert!(snapshot.supports_emotion("emo_voice"));
                    }
                })
            })
            .collect();
        for _ in 0..20 {
            registry.reload();
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
