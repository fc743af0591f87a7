//! Cache Sweeper - 过期缓存与音频文件清理

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{AudioStoragePort, SynthesisCachePort};

/// Sweeper 配置
#[derive(Debug, Clone)]
pub struct CacheSweeperConfig {
    /// 清理间隔
    pub interval: Duration,
    /// 音频文件保留时长
    pub file_max_age: Duration,
}

impl Default for CacheSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            file_max_age: Duration::from_secs(24 * 3600),
        }
    }
}

/// 缓存清理 Worker
///
/// 读取本身已保证不返回过期条目，这里只负责回收空间
pub struct CacheSweeper {
    config: CacheSweeperConfig,
    cache: Arc<dyn SynthesisCachePort>,
    storage: Arc<dyn AudioStoragePort>,
    shutdown: CancellationToken,
}

impl CacheSweeper {
    pub fn new(
        config: CacheSweeperConfig,
        cache: Arc<dyn SynthesisCachePort>,
        storage: Arc<dyn AudioStoragePort>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            cache,
            storage,
            shutdown,
        }
    }

    /// 启动 Worker，直到取消令牌触发
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            file_max_age_secs = self.config.file_max_age.as_secs(),
            "CacheSweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        // 第一次 tick 立即返回
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep_once().await,
            }
        }

        tracing::info!("CacheSweeper stopped");
    }

    /// 执行一轮清理，失败只记录日志
    pub async fn sweep_once(&self) {
        match self.cache.sweep().await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed = removed, "Expired cache entries swept");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Cache sweep failed");
            }
        }

        if let Err(e) = self.storage.purge_older_than(self.config.file_max_age).await {
            tracing::warn!(error = %e, "Audio purge failed");
        }
    }
}
