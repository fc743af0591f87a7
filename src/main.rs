//! Volcano TTS - 命令行入口
//!
//! 子命令:
//! - synthesize: 完整编排（缓存、持久化、元数据），输出 JSON 结果
//! - stream: 流式合成，边收边写文件
//! - voices: 列出/过滤音色
//! - cache-stats: 缓存统计
//! - sweep: 清理过期缓存与音频
//! - check: 服务商连通性检查

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use volcano_tts::application::{
    GetCacheStats, GetCacheStatsHandler, GetVoice, GetVoiceHandler, ListVoices, ListVoicesHandler,
    ReloadVoices, ReloadVoicesHandler, SynthesisCachePort, SynthesizeCommand, SynthesizeHandler,
    SynthesizeOptions, SynthesizeStreamCommand, SynthesizeStreamHandler, TtsEnginePort,
    VoiceCatalogPort,
};
use volcano_tts::config::{load_config_from_path, print_config, AppConfig};
use volcano_tts::domain::catalog::VoiceFilter;
use volcano_tts::domain::synthesis::{AudioEncoding, SynthesisRequest};
use volcano_tts::infrastructure::{
    open_synthesis_cache, CacheSweeper, CacheSweeperConfig, FileAudioStorage, SymphoniaProbe,
    VoiceCatalogRegistry, VolcanoClientConfig, VolcanoTtsClient,
};

#[derive(Debug, Parser)]
#[command(name = "volcano-tts", version, about = "火山引擎语音合成")]
struct Cli {
    /// 配置文件路径（默认搜索 config.toml / config.local.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 合成并保存音频，输出结果 JSON
    Synthesize {
        #[command(flatten)]
        request: RequestArgs,

        /// 调用方标识（仅用于审计日志）
        #[arg(long)]
        caller: Option<String>,
    },
    /// 流式合成，直接写入文件
    Stream {
        #[command(flatten)]
        request: RequestArgs,

        /// 输出文件
        #[arg(short, long)]
        output: PathBuf,
    },
    /// 列出音色
    Voices {
        /// 查看单个音色详情
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// 只显示支持（true）或不支持（false）情感的音色
        #[arg(long)]
        emotion: Option<bool>,
        #[arg(long)]
        search: Option<String>,
        /// 列出前重新读取音色配置文档
        #[arg(long)]
        reload: bool,
    },
    /// 缓存统计
    CacheStats,
    /// 清理过期缓存与音频文件
    Sweep {
        /// 持续运行，直到 Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// 检查服务商连通性
    Check,
}

#[derive(Debug, Args)]
struct RequestArgs {
    /// 要合成的文本
    #[arg(short, long)]
    text: String,
    /// 音色 ID（默认使用配置中的默认音色）
    #[arg(short, long)]
    voice: Option<String>,
    #[arg(long, default_value_t = 1.0)]
    speed: f32,
    #[arg(long, default_value_t = 1.0)]
    volume: f32,
    #[arg(long, default_value_t = 1.0)]
    pitch: f32,
    /// mp3 / wav / pcm
    #[arg(short, long, default_value = "mp3")]
    format: String,
    #[arg(long)]
    emotion: Option<String>,
    #[arg(long, default_value_t = 24000)]
    sample_rate: u32,
    #[arg(long, default_value_t = 128)]
    bitrate: u32,
}

impl RequestArgs {
    fn build(&self, config: &AppConfig) -> anyhow::Result<SynthesisRequest> {
        let voice = self
            .voice
            .clone()
            .unwrap_or_else(|| config.volcano.default_voice.clone());
        let encoding: AudioEncoding = self.format.parse()?;
        let request = SynthesisRequest::builder(self.text.clone(), voice)
            .speed(self.speed)
            .volume(self.volume)
            .pitch(self.pitch)
            .encoding(encoding)
            .emotion(self.emotion.clone())
            .sample_rate(self.sample_rate)
            .bitrate(self.bitrate)
            .max_text_length(config.synthesis.max_text_length)
            .build()?;
        Ok(request)
    }
}

/// 组装后的组件
struct Components {
    catalog: Arc<VoiceCatalogRegistry>,
    tts_engine: Arc<VolcanoTtsClient>,
    cache: Arc<dyn SynthesisCachePort>,
    storage: Arc<FileAudioStorage>,
}

async fn build_components(config: &AppConfig) -> anyhow::Result<Components> {
    let catalog = Arc::new(match config.voices.presets_path.clone() {
        Some(path) => VoiceCatalogRegistry::new(Some(path), config.volcano.default_voice.clone()),
        None => VoiceCatalogRegistry::discovering(config.volcano.default_voice.clone()),
    });

    let client_config = VolcanoClientConfig {
        app_id: config.volcano.app_id.clone(),
        access_token: config.volcano.access_token.clone(),
        cluster: config.volcano.cluster.clone(),
        host: config.volcano.host.clone(),
        endpoint: config.volcano.endpoint.clone(),
        recv_timeout: config.volcano.recv_timeout(),
        call_timeout: config.volcano.call_timeout(),
        default_voice: config.volcano.default_voice.clone(),
    };
    let tts_engine = Arc::new(VolcanoTtsClient::new(client_config, catalog.clone()));

    let cache = open_synthesis_cache(&config.cache);

    let storage = Arc::new(
        FileAudioStorage::new(
            &config.storage.audio_dir,
            config.storage.public_url_prefix.clone(),
        )
        .await?,
    );

    Ok(Components {
        catalog,
        tts_engine,
        cache,
        storage,
    })
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},volcano_tts={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    // 日志输出到 stderr，stdout 留给命令结果
    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 凭据文档 > 配置文件 > 默认值）
    let config = load_config_from_path(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    print_config(&config);

    if !config.volcano.has_credentials() {
        tracing::warn!("Volcano credentials not configured, provider calls will be rejected");
    }

    let components = build_components(&config).await?;

    match cli.command {
        Command::Synthesize { request, caller } => {
            let request = request.build(&config)?;
            let handler = SynthesizeHandler::new(
                components.tts_engine.clone(),
                components.cache.clone(),
                components.storage.clone(),
                Arc::new(SymphoniaProbe::new()),
                SynthesizeOptions {
                    cache_enabled: config.cache.enabled,
                    cache_ttl: config.cache.ttl(),
                    single_flight: config.cache.single_flight,
                },
            );

            let mut command = SynthesizeCommand::new(request);
            if let Some(caller) = caller {
                command = command.with_caller(caller);
            }
            let result = handler.handle(command).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Stream { request, output } => {
            let request = request.build(&config)?;
            let handler = SynthesizeStreamHandler::new(components.tts_engine.clone());
            let mut stream = handler
                .handle(SynthesizeStreamCommand { request })
                .await?;

            let mut file = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("failed to create {}", output.display()))?;
            let mut written = 0usize;
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        // 不完整的音频不保留
                        drop(file);
                        let _ = tokio::fs::remove_file(&output).await;
                        return Err(e.into());
                    }
                };
                file.write_all(&chunk).await?;
                written += chunk.len();
            }
            file.flush().await?;
            tracing::info!(path = %output.display(), size_bytes = written, "Stream saved");
        }
        Command::Voices {
            id,
            category,
            language,
            emotion,
            search,
            reload,
        } => {
            let catalog: Arc<dyn VoiceCatalogPort> = components.catalog.clone();
            if reload {
                ReloadVoicesHandler::new(catalog.clone()).handle(ReloadVoices);
            }

            if let Some(voice_id) = id {
                let voice = GetVoiceHandler::new(catalog).handle(GetVoice { voice_id })?;
                println!("{}", serde_json::to_string_pretty(&voice)?);
            } else {
                let response = ListVoicesHandler::new(catalog).handle(ListVoices {
                    filter: VoiceFilter {
                        category,
                        language,
                        emotion_support: emotion,
                        search,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Command::CacheStats => {
            let stats = GetCacheStatsHandler::new(components.cache.clone())
                .handle(GetCacheStats)
                .await;
            println!(
                "{}",
                serde_json::json!({
                    "stats": stats,
                    "hit_rate": stats.hit_rate(),
                })
            );
        }
        Command::Sweep { watch } => {
            let shutdown = CancellationToken::new();
            let sweeper = CacheSweeper::new(
                CacheSweeperConfig {
                    interval: config.cache.sweep_interval(),
                    file_max_age: config.storage.file_max_age(),
                },
                components.cache.clone(),
                components.storage.clone(),
                shutdown.clone(),
            );

            if watch {
                let handle = tokio::spawn(sweeper.run());
                tokio::signal::ctrl_c().await?;
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
                handle.await?;
            } else {
                sweeper.sweep_once().await;
            }
        }
        Command::Check => {
            let healthy = components.tts_engine.health_check().await;
            println!("{}", serde_json::json!({ "healthy": healthy }));
            if !healthy {
                anyhow::bail!("TTS provider check failed");
            }
        }
    }

    Ok(())
}
