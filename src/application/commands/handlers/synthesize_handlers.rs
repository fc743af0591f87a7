//! Synthesize Command Handlers - 合成编排
//!
//! 编排流程:
//! 1. 计算请求指纹，缓存命中则直接返回（不调用服务商）
//! 2. 未命中时分配请求 ID 与输出位置
//! 3. 驱动流式客户端直到终止块，按到达顺序拼接音频
//! 4. 原子写入存储，探测时长
//! 5. 以元数据（不含路径）回填缓存

use chrono::Utc;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::application::commands::{SynthesizeCommand, SynthesizeStreamCommand};
use crate::application::error::SynthesisError;
use crate::application::ports::{
    fingerprint, AudioProbePort, AudioStoragePort, CachedSynthesis, SynthesisCachePort,
    TtsEnginePort,
};
use crate::domain::synthesis::{SynthesisRequest, SynthesisResult, SynthesisStatus};

/// 编排选项
#[derive(Debug, Clone)]
pub struct SynthesizeOptions {
    /// 是否启用结果缓存
    pub cache_enabled: bool,
    /// 缓存 TTL
    pub cache_ttl: Duration,
    /// 同一指纹的并发未命中是否合并为一次合成
    pub single_flight: bool,
}

impl Default for SynthesizeOptions {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            single_flight: true,
        }
    }
}

// ============================================================================
// Synthesize
// ============================================================================

/// Synthesize Handler - 合成编排器
pub struct SynthesizeHandler {
    tts_engine: Arc<dyn TtsEnginePort>,
    cache: Arc<dyn SynthesisCachePort>,
    storage: Arc<dyn AudioStoragePort>,
    probe: Arc<dyn AudioProbePort>,
    options: SynthesizeOptions,
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SynthesizeHandler {
    pub fn new(
        tts_engine: Arc<dyn TtsEnginePort>,
        cache: Arc<dyn SynthesisCachePort>,
        storage: Arc<dyn AudioStoragePort>,
        probe: Arc<dyn AudioProbePort>,
        options: SynthesizeOptions,
    ) -> Self {
        Self {
            tts_engine,
            cache,
            storage,
            probe,
            options,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub async fn handle(&self, command: SynthesizeCommand) -> Result<SynthesisResult, SynthesisError> {
        let request = &command.request;
        let cache_key = fingerprint(request);

        let result = if !self.options.cache_enabled {
            self.synthesize(request, &cache_key).await
        } else if let Some(hit) = self.try_cache_hit(&cache_key).await {
            Ok(hit)
        } else if self.options.single_flight {
            let _flight = InFlight::acquire(self.in_flight.clone(), &cache_key).await;
            // 等锁期间可能已有同指纹的调用完成并写入缓存
            match self.try_cache_hit(&cache_key).await {
                Some(hit) => Ok(hit),
                None => self.synthesize(request, &cache_key).await,
            }
        } else {
            self.synthesize(request, &cache_key).await
        };

        match &result {
            Ok(result) => {
                tracing::info!(
                    caller = command.caller_id.as_deref().unwrap_or("anonymous"),
                    request_id = %result.request_id,
                    text_len = request.text().chars().count(),
                    voice_id = %request.voice_id(),
                    cache_hit = result.cache_hit,
                    "Synthesis audit"
                );
            }
            Err(e) => {
                tracing::error!(
                    caller = command.caller_id.as_deref().unwrap_or("anonymous"),
                    voice_id = %request.voice_id(),
                    error = %e,
                    "Synthesis failed"
                );
            }
        }

        result
    }

    /// 缓存命中时生成新的请求 ID 与存储位置，并把保留的内容放到该位置
    ///
    /// 缓存故障或保留内容缺失都按未命中处理
    async fn try_cache_hit(&self, cache_key: &str) -> Option<SynthesisResult> {
        let entry = match self.cache.get(cache_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    cache_key = %cache_key,
                    error = %SynthesisError::from(e),
                    "Cache lookup failed, treating as miss"
                );
                return None;
            }
        };

        let cached = entry.value;
        let request_id = Uuid::new_v4();
        let file_path = self.storage.audio_path(request_id, cached.format);

        match self.storage.restore(cache_key, cached.format, &file_path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(cache_key = %cache_key, "Retained audio missing, dropping cache entry");
                if let Err(e) = self.cache.delete(cache_key).await {
                    tracing::warn!(cache_key = %cache_key, error = %e, "Failed to drop stale cache entry");
                }
                return None;
            }
            Err(e) => {
                tracing::warn!(cache_key = %cache_key, error = %e, "Failed to restore retained audio");
                return None;
            }
        }

        tracing::info!(
            cache_key = %cache_key,
            request_id = %request_id,
            "Cache hit, skipping synthesis"
        );

        Some(SynthesisResult {
            request_id,
            voice_id: cached.voice_id,
            format: cached.format,
            file_url: self.storage.public_url(&file_path),
            file_path,
            file_size: cached.file_size,
            duration: cached.duration,
            synthesis_time: cached.synthesis_time,
            created_at: Utc::now(),
            status: SynthesisStatus::Success,
            cache_hit: true,
        })
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        cache_key: &str,
    ) -> Result<SynthesisResult, SynthesisError> {
        let request_id = Uuid::new_v4();
        let encoding = request.encoding();
        let file_path = self.storage.audio_path(request_id, encoding);

        tracing::info!(
            request_id = %request_id,
            text_len = request.text().chars().count(),
            voice_id = %request.voice_id(),
            "Starting synthesis"
        );

        let started = Instant::now();
        let audio = self.collect_audio(request).await?;
        let synthesis_time = started.elapsed().as_secs_f64();

        if audio.is_empty() {
            return Err(SynthesisError::failed("provider returned no audio"));
        }

        let file_size = self.storage.save_audio(&file_path, &audio).await?;
        let duration = self.probe_duration(&file_path, request).await;

        let result = SynthesisResult {
            request_id,
            voice_id: request.voice_id().to_string(),
            format: encoding,
            file_url: self.storage.public_url(&file_path),
            file_path,
            file_size,
            duration,
            synthesis_time,
            created_at: Utc::now(),
            status: SynthesisStatus::Success,
            cache_hit: false,
        };

        if self.options.cache_enabled {
            self.populate_cache(cache_key, &result).await;
        }

        tracing::info!(
            request_id = %request_id,
            size_bytes = file_size,
            duration = ?duration,
            synthesis_time = synthesis_time,
            "Synthesis completed"
        );

        Ok(result)
    }

    /// 拉取整条音频流；任何错误都会丢弃已收到的部分音频
    async fn collect_audio(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let mut stream = self.tts_engine.stream(request).await?;
        let mut audio = Vec::new();
        while let Some(chunk) = stream.next().await {
            audio.extend_from_slice(&chunk?);
        }
        Ok(audio)
    }

    async fn probe_duration(&self, path: &PathBuf, request: &SynthesisRequest) -> Option<f64> {
        match self
            .probe
            .duration(path, request.encoding(), request.sample_rate())
            .await
        {
            Ok(duration) => Some(duration),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to probe audio duration");
                None
            }
        }
    }

    /// 先保留内容副本，再写缓存；任一步失败只记录日志
    async fn populate_cache(&self, cache_key: &str, result: &SynthesisResult) {
        if let Err(e) = self.storage.retain(cache_key, &result.file_path).await {
            tracing::warn!(cache_key = %cache_key, error = %e, "Failed to retain audio, skipping cache");
            return;
        }

        let value = CachedSynthesis {
            voice_id: result.voice_id.clone(),
            format: result.format,
            file_size: result.file_size,
            duration: result.duration,
            synthesis_time: result.synthesis_time,
        };

        if let Err(e) = self.cache.set(cache_key, value, self.options.cache_ttl).await {
            tracing::warn!(
                cache_key = %cache_key,
                error = %SynthesisError::from(e),
                "Failed to populate cache"
            );
        }
    }
}

/// 同一指纹的进行中合成
///
/// 持有期间其他同指纹调用等待；释放后若无人等待则移除锁
struct InFlight {
    map: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlight {
    async fn acquire(map: Arc<DashMap<String, Arc<Mutex<()>>>>, key: &str) -> Self {
        let lock = map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Self {
            map,
            key: key.to_string(),
            guard: Some(guard),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ============================================================================
// SynthesizeStream
// ============================================================================

/// 流式合成输出
pub type SynthesisStream =
    Pin<Box<dyn Stream<Item = Result<bytes::Bytes, SynthesisError>> + Send>>;

/// SynthesizeStream Handler
///
/// 直接转发到流式客户端，不经过缓存与持久化
pub struct SynthesizeStreamHandler {
    tts_engine: Arc<dyn TtsEnginePort>,
}

impl SynthesizeStreamHandler {
    pub fn new(tts_engine: Arc<dyn TtsEnginePort>) -> Self {
        Self { tts_engine }
    }

    pub async fn handle(
        &self,
        command: SynthesizeStreamCommand,
    ) -> Result<SynthesisStream, SynthesisError> {
        tracing::info!(
            text_len = command.request.text().chars().count(),
            voice_id = %command.request.voice_id(),
            "Starting streaming synthesis"
        );

        let stream = self.tts_engine.stream(&command.request).await?;
        Ok(Box::pin(stream.map(|chunk| chunk.map_err(SynthesisError::from))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{AudioStream, CacheEntry, CacheError, ProbeError, TtsError};
    use crate::domain::synthesis::AudioEncoding;
    use crate::infrastructure::adapters::FileAudioStorage;
    use crate::infrastructure::memory::InMemorySynthesisCache;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// 按脚本产出音频块的引擎
    struct ScriptedEngine {
        calls: AtomicUsize,
        script: Vec<Result<&'static [u8], (u32, &'static str)>>,
        delay: Duration,
    }

    impl ScriptedEngine {
        fn ok(chunks: Vec<&'static [u8]>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                script: chunks.into_iter().map(Ok).collect(),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TtsEnginePort for ScriptedEngine {
        async fn stream(&self, _request: &SynthesisRequest) -> Result<AudioStream, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let items: Vec<Result<Bytes, TtsError>> = self
                .script
                .iter()
                .map(|item| match item {
                    Ok(chunk) => Ok(Bytes::from_static(chunk)),
                    Err((code, message)) => Err(TtsError::Provider {
                        code: *code,
                        message: message.to_string(),
                    }),
                })
                .collect();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    struct FixedProbe(Option<f64>);

    #[async_trait]
    impl AudioProbePort for FixedProbe {
        async fn duration(
            &self,
            _path: &Path,
            _encoding: AudioEncoding,
            _sample_rate: u32,
        ) -> Result<f64, ProbeError> {
            self.0
                .ok_or_else(|| ProbeError::Unsupported("fixed probe".to_string()))
        }
    }

    /// 所有操作都失败的缓存
    struct BrokenCache;

    #[async_trait]
    impl SynthesisCachePort for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: CachedSynthesis,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn sweep(&self) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn stats(&self) -> crate::application::ports::CacheStats {
            Default::default()
        }
    }

    async fn handler(
        engine: Arc<ScriptedEngine>,
        dir: &Path,
        probe: Option<f64>,
    ) -> SynthesizeHandler {
        let storage = FileAudioStorage::new(dir, "/audio").await.unwrap();
        SynthesizeHandler::new(
            engine,
            Arc::new(InMemorySynthesisCache::new(100)),
            Arc::new(storage),
            Arc::new(FixedProbe(probe)),
            SynthesizeOptions::default(),
        )
    }

    fn command(text: &str) -> SynthesizeCommand {
        SynthesizeCommand::new(SynthesisRequest::builder(text, "v1").build().unwrap())
    }

    #[tokio::test]
    async fn test_second_call_is_cache_hit() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::ok(vec![b"abc", b"def"]));
        let handler = handler(engine.clone(), dir.path(), Some(1.5)).await;

        let first = handler.handle(command("hello")).await.unwrap();
        let second = handler.handle(command("hello")).await.unwrap();

        assert_eq!(engine.calls(), 1);
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_ne!(first.request_id, second.request_id);
        assert_ne!(first.file_path, second.file_path);
        assert_eq!(first.file_size, 6);
        assert_eq!(second.file_size, first.file_size);
        assert_eq!(second.duration, Some(1.5));
        assert_eq!(std::fs::read(&second.file_path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_cache_failure_falls_through_to_synthesis() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::ok(vec![b"ab", b"cd"]));
        let storage = FileAudioStorage::new(dir.path(), "/audio").await.unwrap();
        let handler = SynthesizeHandler::new(
            engine.clone(),
            Arc::new(BrokenCache),
            Arc::new(storage),
            Arc::new(FixedProbe(None)),
            SynthesizeOptions::default(),
        );

        let first = handler.handle(command("hello")).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.file_size, 4);
        assert_eq!(std::fs::read(&first.file_path).unwrap(), b"abcd");

        // 写缓存失败也不影响结果，下一次照常合成
        let second = handler.handle(command("hello")).await.unwrap();
        assert!(!second.cache_hit);
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_duration_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine::ok(vec![b"abc"]));
        let handler = handler(engine, dir.path(), None).await;

        let result = handler.handle(command("hello")).await.unwrap();
        assert_eq!(result.duration, None);
        assert!(result.file_path.exists());
        assert!(result.file_url.starts_with("/audio/tts_"));
    }

    #[tokio::test]
    async fn test_provider_error_leaves_no_file() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine {
            calls: AtomicUsize::new(0),
            script: vec![Ok(b"partial"), Err((45000, "invalid text"))],
            delay: Duration::ZERO,
        });
        let handler = handler(engine, dir.path(), None).await;

        let err = handler.handle(command("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::ProviderError { code: 45000, ref message } if message == "invalid text"
        ));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .collect();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_coalesced() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(ScriptedEngine {
            calls: AtomicUsize::new(0),
            script: vec![Ok(b"abc")],
            delay: Duration::from_millis(100),
        });
        let handler = Arc::new(handler(engine.clone(), dir.path(), None).await);

        let a = tokio::spawn({
            let handler = handler.clone();
            async move { handler.handle(command("same")).await }
        });
        let b = tokio::spawn({
            let handler = handler.clone();
            async move { handler.handle(command("same")).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(engine.calls(), 1);
        assert!(a.cache_hit != b.cache_hit);
        assert!(handler.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_stream_handler_forwards_chunks() {
        let engine = Arc::new(ScriptedEngine::ok(vec![b"ab", b"cd"]));
        let handler = SynthesizeStreamHandler::new(engine.clone());

        let stream = handler
            .handle(SynthesizeStreamCommand {
                request: SynthesisRequest::builder("hello", "v1").build().unwrap(),
            })
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
        assert_eq!(engine.calls(), 1);
    }
}
