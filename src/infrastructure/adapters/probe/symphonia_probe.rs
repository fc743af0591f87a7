//! Symphonia Probe - 基于 symphonia 的音频时长探测
//!
//! 支持：
//! - MP3 / WAV：读取容器信息，缺少总帧数时累加包时长
//! - PCM：裸 16-bit 单声道，按字节数与采样率计算

use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{AudioProbePort, ProbeError};
use crate::domain::synthesis::AudioEncoding;

/// 裸 PCM 每个采样的字节数
const PCM_BYTES_PER_SAMPLE: u64 = 2;

/// Symphonia 时长探测器
#[derive(Debug, Clone, Default)]
pub struct SymphoniaProbe;

impl SymphoniaProbe {
    pub fn new() -> Self {
        Self
    }

    fn probe_container(path: &Path, encoding: AudioEncoding) -> Result<f64, ProbeError> {
        let file = File::open(path).map_err(|e| ProbeError::IoError(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(encoding.extension());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| ProbeError::Unsupported(format!("Probe failed: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| ProbeError::DecodingError("No audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        if let (Some(n_frames), Some(sample_rate)) = (params.n_frames, params.sample_rate) {
            if sample_rate > 0 {
                return Ok(n_frames as f64 / sample_rate as f64);
            }
        }

        // 没有总帧数（如无 Xing 头的 MP3），逐包累加
        let mut total_ts: u64 = 0;
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(ProbeError::DecodingError(format!(
                        "Packet read error: {}",
                        e
                    )));
                }
            };
            if packet.track_id() == track_id {
                total_ts += packet.dur;
            }
        }

        if let Some(time_base) = params.time_base {
            let time = time_base.calc_time(total_ts);
            return Ok(time.seconds as f64 + time.frac);
        }

        match params.sample_rate {
            Some(sample_rate) if sample_rate > 0 => Ok(total_ts as f64 / sample_rate as f64),
            _ => Err(ProbeError::DecodingError("Unknown sample rate".to_string())),
        }
    }

    fn probe_pcm(path: &Path, sample_rate: u32) -> Result<f64, ProbeError> {
        if sample_rate == 0 {
            return Err(ProbeError::Unsupported("PCM sample rate is zero".to_string()));
        }
        let len = std::fs::metadata(path)
            .map_err(|e| ProbeError::IoError(e.to_string()))?
            .len();
        Ok(len as f64 / (sample_rate as u64 * PCM_BYTES_PER_SAMPLE) as f64)
    }
}

#[async_trait]
impl AudioProbePort for SymphoniaProbe {
    async fn duration(
        &self,
        path: &Path,
        encoding: AudioEncoding,
        sample_rate: u32,
    ) -> Result<f64, ProbeError> {
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || match encoding {
            AudioEncoding::Pcm => Self::probe_pcm(&path, sample_rate),
            AudioEncoding::Mp3 | AudioEncoding::Wav => Self::probe_container(&path, encoding),
        })
        .await
        .map_err(|e| ProbeError::IoError(format!("probe task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 生成 16-bit 单声道 WAV
    fn wav_bytes(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_size = samples * 2;
        let mut buf = Vec::with_capacity(44 + data_size as usize);
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + data_size).to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&16u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        buf.resize(44 + data_size as usize, 0);
        buf
    }

    #[tokio::test]
    async fn test_wav_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, wav_bytes(24000, 12000)).unwrap();

        let duration = SymphoniaProbe::new()
            .duration(&path, AudioEncoding::Wav, 24000)
            .await
            .unwrap();
        assert!((duration - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pcm_duration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pcm");
        std::fs::write(&path, vec![0u8; 48000]).unwrap();

        let duration = SymphoniaProbe::new()
            .duration(&path, AudioEncoding::Pcm, 24000)
            .await
            .unwrap();
        assert!((duration - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_garbage_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = SymphoniaProbe::new()
            .duration(&path, AudioEncoding::Mp3, 24000)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = SymphoniaProbe::new()
            .duration(Path::new("/nonexistent/a.wav"), AudioEncoding::Wav, 24000)
            .await;
        assert!(matches!(result, Err(ProbeError::IoError(_))));
    }
}
