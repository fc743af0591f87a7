//! File Storage - 文件系统音频存储实现
//!
//! 实现 AudioStoragePort trait
//!
//! 目录布局:
//! - `<base>/tts_<request_id>.<ext>`  合成输出
//! - `<base>/.tmp/<uuid>.part`         写入中的临时文件
//! - `<base>/cache/<key>.<ext>`        按缓存 key 保留的内容副本

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use uuid::Uuid;

use crate::application::ports::{AudioStorageError, AudioStoragePort, PurgeResult};
use crate::domain::synthesis::AudioEncoding;

const TMP_DIR: &str = ".tmp";
const RETAINED_DIR: &str = "cache";
const OUTPUT_PREFIX: &str = "tts_";

fn io_err(e: std::io::Error) -> AudioStorageError {
    AudioStorageError::IoError(e.to_string())
}

/// 文件系统音频存储
pub struct FileAudioStorage {
    /// 存储根目录
    base_dir: PathBuf,
    /// 公开访问 URL 前缀
    public_url_prefix: String,
}

impl FileAudioStorage {
    /// 创建新的文件存储
    pub async fn new(
        base_dir: impl AsRef<Path>,
        public_url_prefix: impl Into<String>,
    ) -> Result<Self, AudioStorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        // 确保目录存在
        for dir in [
            base_dir.clone(),
            base_dir.join(TMP_DIR),
            base_dir.join(RETAINED_DIR),
        ] {
            fs::create_dir_all(&dir).await.map_err(io_err)?;
        }

        Ok(Self {
            base_dir,
            public_url_prefix: public_url_prefix.into(),
        })
    }

    fn retained_path(&self, key: &str, encoding: AudioEncoding) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.base_dir
            .join(RETAINED_DIR)
            .join(format!("{}.{}", name, encoding.extension()))
    }

    fn tmp_path(&self) -> PathBuf {
        self.base_dir
            .join(TMP_DIR)
            .join(format!("{}.part", Uuid::new_v4()))
    }

    /// 先写到临时文件再 rename，读者不会看到写了一半的文件
    async fn write_atomic(&self, dest: &Path, data: &[u8]) -> Result<(), AudioStorageError> {
        let tmp = self.tmp_path();
        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        self.promote(&tmp, dest).await
    }

    async fn copy_atomic(&self, source: &Path, dest: &Path) -> Result<(), AudioStorageError> {
        let tmp = self.tmp_path();
        if let Err(e) = fs::copy(source, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        self.promote(&tmp, dest).await
    }

    async fn promote(&self, tmp: &Path, dest: &Path) -> Result<(), AudioStorageError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        if let Err(e) = fs::rename(tmp, dest).await {
            let _ = fs::remove_file(tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }

    /// 删除目录下修改时间早于 cutoff 的文件
    async fn purge_dir(
        &self,
        dir: &Path,
        cutoff: SystemTime,
        accept: impl Fn(&Path) -> bool,
        result: &mut PurgeResult,
    ) -> Result<(), AudioStorageError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(e)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if !accept(&path) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::now());
            if modified > cutoff {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    result.deleted_files += 1;
                    result.freed_bytes += metadata.len();
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to purge audio file");
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AudioStoragePort for FileAudioStorage {
    fn audio_path(&self, request_id: Uuid, encoding: AudioEncoding) -> PathBuf {
        self.base_dir.join(format!(
            "{}{}.{}",
            OUTPUT_PREFIX,
            request_id,
            encoding.extension()
        ))
    }

    fn public_url(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!(
            "{}/{}",
            self.public_url_prefix.trim_end_matches('/'),
            file_name
        )
    }

    async fn save_audio(&self, path: &Path, data: &[u8]) -> Result<u64, AudioStorageError> {
        self.write_atomic(path, data).await?;

        tracing::debug!(
            path = %path.display(),
            size_bytes = data.len(),
            "Saved audio"
        );

        Ok(data.len() as u64)
    }

    async fn retain(&self, key: &str, source: &Path) -> Result<(), AudioStorageError> {
        let encoding = source
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<AudioEncoding>().ok())
            .ok_or_else(|| {
                AudioStorageError::IoError(format!("unknown audio extension: {}", source.display()))
            })?;

        if !fs::try_exists(source).await.map_err(io_err)? {
            return Err(AudioStorageError::FileNotFound(
                source.to_string_lossy().to_string(),
            ));
        }

        self.copy_atomic(source, &self.retained_path(key, encoding))
            .await
    }

    async fn restore(
        &self,
        key: &str,
        encoding: AudioEncoding,
        dest: &Path,
    ) -> Result<bool, AudioStorageError> {
        let retained = self.retained_path(key, encoding);
        if !fs::try_exists(&retained).await.map_err(io_err)? {
            return Ok(false);
        }

        match self.copy_atomic(&retained, dest).await {
            Ok(()) => Ok(true),
            // 清理任务可能刚好删掉了保留文件
            Err(_) if !retained.exists() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_audio(&self, path: &Path) -> Result<(), AudioStorageError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Deleted audio");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn purge_older_than(&self, max_age: Duration) -> Result<PurgeResult, AudioStorageError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut result = PurgeResult::default();

        let is_output = |path: &Path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(OUTPUT_PREFIX))
        };
        self.purge_dir(&self.base_dir, cutoff, is_output, &mut result)
            .await?;
        self.purge_dir(&self.base_dir.join(RETAINED_DIR), cutoff, |_| true, &mut result)
            .await?;
        self.purge_dir(&self.base_dir.join(TMP_DIR), cutoff, |_| true, &mut result)
            .await?;

        if result.deleted_files > 0 {
            tracing::info!(
                deleted_files = result.deleted_files,
                freed_bytes = result.freed_bytes,
                "Purged expired audio files"
            );
        }

        Ok(result)
    }
}
