//! Catalog Context - 音色目录

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 内置的情感音色列表，配置文档缺失时使用
const DEFAULT_EMOTION_VOICES: &[&str] = &[
    "zh_male_beijingxiaoye_emo_v2_mars_bigtts",
    "zh_female_roumeinvyou_emo_v2_mars_bigtts",
    "zh_male_yangguangqingnian_emo_v2_mars_bigtts",
    "zh_female_meilinvyou_emo_v2_mars_bigtts",
    "zh_female_shuangkuaisisi_emo_v2_mars_bigtts",
];

pub fn default_emotion_voices() -> Vec<String> {
    DEFAULT_EMOTION_VOICES.iter().map(|v| v.to_string()).collect()
}

/// 音色信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub language: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub emotions: Option<Vec<String>>,
}

impl VoiceInfo {
    /// 音色自身声明了非空情感列表
    pub fn has_emotions(&self) -> bool {
        self.emotions.as_ref().map_or(false, |e| !e.is_empty())
    }

    fn matches_search(&self, keyword: &str) -> bool {
        let keyword = keyword.to_lowercase();
        self.name.to_lowercase().contains(&keyword)
            || self.description.to_lowercase().contains(&keyword)
            || self.tags.join(" ").to_lowercase().contains(&keyword)
    }
}

/// 音色分类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceCategory {
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub special: bool,
    pub voices: Vec<VoiceInfo>,
}

/// 音色过滤条件
#[derive(Debug, Clone, Default)]
pub struct VoiceFilter {
    /// 分类名（精确匹配）
    pub category: Option<String>,
    /// 语言（子串匹配，如 "zh"）
    pub language: Option<String>,
    /// 是否支持情感
    pub emotion_support: Option<bool>,
    /// 关键词，匹配名称、描述、标签
    pub search: Option<String>,
}

impl VoiceFilter {
    fn accepts(&self, voice: &VoiceInfo) -> bool {
        if let Some(language) = &self.language {
            if !voice.language.contains(language.as_str()) {
                return false;
            }
        }
        if let Some(wanted) = self.emotion_support {
            if voice.has_emotions() != wanted {
                return false;
            }
        }
        if let Some(keyword) = &self.search {
            if !voice.matches_search(keyword) {
                return false;
            }
        }
        true
    }
}

/// 音色目录快照
///
/// 不变量:
/// - 构造后不可变，重新加载时整体替换
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    categories: Vec<VoiceCategory>,
    emotion_voices: HashSet<String>,
}

impl VoiceCatalog {
    pub fn new(categories: Vec<VoiceCategory>, emotion_voices: Vec<String>) -> Self {
        Self {
            categories,
            emotion_voices: emotion_voices.into_iter().collect(),
        }
    }

    /// 配置不可用时的回退目录：一个通用分类 + 内置情感音色列表
    pub fn fallback(default_voice: &str) -> Self {
        let voice = VoiceInfo {
            id: default_voice.to_string(),
            name: "默认女声".to_string(),
            description: "默认女声音色".to_string(),
            category: "通用".to_string(),
            language: "zh-CN".to_string(),
            tags: vec!["通用".to_string(), "女声".to_string()],
            emotions: None,
        };
        let category = VoiceCategory {
            name: "通用音色".to_string(),
            description: "基础音色".to_string(),
            icon: "🎙️".to_string(),
            color: "#4ECDC4".to_string(),
            special: false,
            voices: vec![voice],
        };
        Self::new(vec![category], default_emotion_voices())
    }

    pub fn supports_emotion(&self, voice_id: &str) -> bool {
        self.emotion_voices.contains(voice_id)
    }

    pub fn categories(&self) -> &[VoiceCategory] {
        &self.categories
    }

    /// 支持情感的音色 ID（排序后返回，保证输出稳定）
    pub fn emotion_voices(&self) -> Vec<String> {
        let mut voices: Vec<String> = self.emotion_voices.iter().cloned().collect();
        voices.sort();
        voices
    }

    pub fn voice_count(&self) -> usize {
        self.categories.iter().map(|c| c.voices.len()).sum()
    }

    pub fn find(&self, voice_id: &str) -> Option<&VoiceInfo> {
        self.categories
            .iter()
            .flat_map(|c| c.voices.iter())
            .find(|v| v.id == voice_id)
    }

    /// 按条件过滤，过滤后为空的分类不返回
    pub fn filter(&self, filter: &VoiceFilter) -> Vec<VoiceCategory> {
        self.categories
            .iter()
            .filter(|c| filter.category.as_ref().map_or(true, |name| &c.name == name))
            .filter_map(|c| {
                let voices: Vec<VoiceInfo> = c
                    .voices
                    .iter()
                    .filter(|v| filter.accepts(v))
                    .cloned()
                    .collect();
                if voices.is_empty() {
                    None
                } else {
                    Some(VoiceCategory {
                        voices,
                        ..c.clone()
                    })
                }
            })
            .collect()
    }
}
