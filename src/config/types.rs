//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::synthesis::DEFAULT_MAX_TEXT_LENGTH;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 火山引擎服务商配置
    #[serde(default)]
    pub volcano: VolcanoConfig,

    /// 合成请求配置
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// 结果缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 音频存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 音色目录配置
    #[serde(default)]
    pub voices: VoicesConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 火山引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct VolcanoConfig {
    /// 应用 ID
    #[serde(default)]
    pub app_id: String,

    /// 访问令牌
    #[serde(default)]
    pub access_token: String,

    /// 集群名称
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// 服务主机名
    #[serde(default = "default_volcano_host")]
    pub host: String,

    /// 完整 WebSocket 地址，设置后忽略 host（用于测试或私有部署）
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 单次接收超时（秒）
    #[serde(default = "default_recv_timeout")]
    pub recv_timeout_secs: u64,

    /// 整次调用超时（秒）
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// 默认音色
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// 实际合并进来的凭据文档（由加载器填写）
    #[serde(skip)]
    pub credentials_file: Option<PathBuf>,
}

fn default_cluster() -> String {
    "volcano_tts".to_string()
}

fn default_volcano_host() -> String {
    "openspeech.bytedance.com".to_string()
}

fn default_recv_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    120
}

fn default_voice() -> String {
    "zh_female_shuangkuaisisi_emo_v2_mars_bigtts".to_string()
}

impl Default for VolcanoConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            access_token: String::new(),
            cluster: default_cluster(),
            host: default_volcano_host(),
            endpoint: None,
            recv_timeout_secs: default_recv_timeout(),
            call_timeout_secs: default_call_timeout(),
            default_voice: default_voice(),
            credentials_file: None,
        }
    }
}

impl VolcanoConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs(self.recv_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// 凭据是否已配置
    pub fn has_credentials(&self) -> bool {
        !self.app_id.is_empty() && !self.access_token.is_empty()
    }

    /// 打码后的访问令牌（仅保留前 4 位）
    pub fn masked_token(&self) -> String {
        if self.access_token.is_empty() {
            return "<unset>".to_string();
        }
        let prefix: String = self.access_token.chars().take(4).collect();
        format!("{}****", prefix)
    }
}

/// 合成请求配置
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// 文本长度上限（字符数）
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

fn default_max_text_length() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
        }
    }
}

/// 缓存后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// 进程内缓存
    #[default]
    Memory,
    /// Sled 嵌入式数据库（重启后保留）
    Sled,
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 是否启用缓存
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 后端类型
    #[serde(default)]
    pub backend: CacheBackend,

    /// 条目存活时间（秒）
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// 内存后端的条目上限
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// 后台清理间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Sled 数据库路径
    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,

    /// 同一指纹的并发未命中是否合并
    #[serde(default = "default_true")]
    pub single_flight: bool,
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    1000
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_sled_path() -> PathBuf {
    PathBuf::from("data/cache.sled")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval(),
            sled_path: default_sled_path(),
            single_flight: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 音频文件目录
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// 公开访问 URL 前缀
    #[serde(default = "default_public_url_prefix")]
    pub public_url_prefix: String,

    /// 音频文件保留时长（小时）
    #[serde(default = "default_file_expire_hours")]
    pub file_expire_hours: u64,
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("./audio_files")
}

fn default_public_url_prefix() -> String {
    "/audio".to_string()
}

fn default_file_expire_hours() -> u64 {
    24
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            public_url_prefix: default_public_url_prefix(),
            file_expire_hours: default_file_expire_hours(),
        }
    }
}

impl StorageConfig {
    pub fn file_max_age(&self) -> Duration {
        Duration::from_secs(self.file_expire_hours.saturating_mul(3600))
    }
}

/// 音色目录配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoicesConfig {
    /// 音色配置文档路径，未设置时在当前目录及上两级查找
    #[serde(default)]
    pub presets_path: Option<PathBuf>,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    /// 可选: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
