//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 服务商凭据文档（tts_config.json）
//! 3. 配置文件（config.toml）
//! 4. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::types::{AppConfig, CacheBackend};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 服务商凭据文档文件名
pub const CREDENTIALS_FILE: &str = "tts_config.json";

/// 凭据文档格式
#[derive(Debug, Deserialize)]
struct CredentialsDoc {
    #[serde(default)]
    appid: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    cluster: Option<String>,
}

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `VOLCTTS_`，层级分隔符 `__`）
/// 2. 凭据文档 `tts_config.json`（当前目录及上两级）
/// 3. 配置文件（config.toml 或 config.local.toml）
/// 4. 默认值
///
/// # 环境变量示例
/// - `VOLCTTS_VOLCANO__APP_ID=123456`
/// - `VOLCTTS_VOLCANO__ACCESS_TOKEN=xxxx`
/// - `VOLCTTS_CACHE__BACKEND=sled`
/// - `VOLCTTS_STORAGE__AUDIO_DIR=/data/audio`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let credentials = find_credentials_file();
    load_layered(config_path, credentials.as_deref())
}

/// 按层合并配置；`credentials` 为要叠加的凭据文档
///
/// 凭据文档存在但无法读取或解析时返回错误，不静默忽略
fn load_layered(
    config_path: Option<&Path>,
    credentials: Option<&Path>,
) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("volcano.cluster", "volcano_tts")?
        .set_default("volcano.host", "openspeech.bytedance.com")?
        .set_default("volcano.recv_timeout_secs", 30)?
        .set_default("volcano.call_timeout_secs", 120)?
        .set_default(
            "volcano.default_voice",
            "zh_female_shuangkuaisisi_emo_v2_mars_bigtts",
        )?
        .set_default("synthesis.max_text_length", 1000)?
        .set_default("cache.enabled", true)?
        .set_default("cache.backend", "memory")?
        .set_default("cache.ttl_secs", 3600)?
        .set_default("cache.max_entries", 1000)?
        .set_default("cache.sweep_interval_secs", 300)?
        .set_default("cache.sled_path", "data/cache.sled")?
        .set_default("cache.single_flight", true)?
        .set_default("storage.audio_dir", "./audio_files")?
        .set_default("storage.public_url_prefix", "/audio")?
        .set_default("storage.file_expire_hours", 24)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 凭据文档
    if let Some(path) = credentials {
        let source = credentials_source(path)?;
        builder = builder.add_source(File::from_str(&source, FileFormat::Json));
    }

    // 4. 环境变量（最高优先级）
    // 例如: VOLCTTS_VOLCANO__APP_ID=123456
    builder = builder.add_source(
        Environment::with_prefix("VOLCTTS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let mut app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;
    app_config.volcano.credentials_file = credentials.map(Path::to_path_buf);

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 在当前目录及上两级目录中查找凭据文档
fn find_credentials_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .take(3)
        .map(|dir| dir.join(CREDENTIALS_FILE))
        .find(|path| path.is_file())
}

/// 把凭据文档转换为 volcano 配置节
fn credentials_source(path: &Path) -> Result<String, ConfigError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
    let doc: CredentialsDoc = serde_json::from_str(&data)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    let mut volcano = serde_json::Map::new();
    if !doc.appid.is_empty() {
        volcano.insert("app_id".to_string(), doc.appid.into());
    }
    if !doc.token.is_empty() {
        volcano.insert("access_token".to_string(), doc.token.into());
    }
    if let Some(cluster) = doc.cluster.filter(|c| !c.is_empty()) {
        volcano.insert("cluster".to_string(), cluster.into());
    }

    Ok(serde_json::json!({ "volcano": volcano }).to_string())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.volcano.host.is_empty() && config.volcano.endpoint.is_none() {
        return Err(ConfigError::ValidationError(
            "Volcano host cannot be empty".to_string(),
        ));
    }

    if config.volcano.recv_timeout_secs == 0 || config.volcano.call_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Volcano timeouts cannot be 0".to_string(),
        ));
    }

    if config.synthesis.max_text_length == 0 {
        return Err(ConfigError::ValidationError(
            "Max text length cannot be 0".to_string(),
        ));
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Cache TTL cannot be 0 when cache is enabled".to_string(),
        ));
    }

    // sweep 子命令不论缓存是否启用都会用到
    if config.cache.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Cache sweep interval cannot be 0".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!(
        "Volcano: app_id={}, token={}, cluster={}",
        config.volcano.app_id,
        config.volcano.masked_token(),
        config.volcano.cluster
    );
    match &config.volcano.endpoint {
        Some(endpoint) => tracing::info!("Volcano Endpoint: {}", endpoint),
        None => tracing::info!("Volcano Host: {}", config.volcano.host),
    }
    tracing::info!(
        "Volcano Timeouts: recv={}s, call={}s",
        config.volcano.recv_timeout_secs,
        config.volcano.call_timeout_secs
    );
    if let Some(path) = &config.volcano.credentials_file {
        tracing::info!("Volcano Credentials: {}", path.display());
    }
    tracing::info!("Default Voice: {}", config.volcano.default_voice);
    tracing::info!("Max Text Length: {}", config.synthesis.max_text_length);
    tracing::info!("Cache Enabled: {}", config.cache.enabled);
    if config.cache.enabled {
        let backend = match config.cache.backend {
            CacheBackend::Memory => "memory".to_string(),
            CacheBackend::Sled => format!("sled ({})", config.cache.sled_path.display()),
        };
        tracing::info!("Cache Backend: {}", backend);
        tracing::info!("Cache TTL: {}s", config.cache.ttl_secs);
        tracing::info!("Cache Single Flight: {}", config.cache.single_flight);
    }
    tracing::info!("Audio Directory: {:?}", config.storage.audio_dir);
    tracing::info!("Audio Expire: {}h", config.storage.file_expire_hours);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
