//! Synthesis Context - Value Objects

use serde::{Deserialize, Serialize};

use super::RequestError;

/// 默认文本长度上限（字符数）
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;

/// 默认采样率 (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// 默认比特率 (kbps)
pub const DEFAULT_BITRATE_KBPS: u32 = 128;

/// 未指定情感时参与缓存 key 计算的占位值
pub const NEUTRAL_EMOTION: &str = "neutral";

/// 服务商接受的采样率
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[8000, 16000, 22050, 24000, 32000, 44100, 48000];

const SPEED_RANGE: (f32, f32) = (0.5, 2.0);
const VOLUME_RANGE: (f32, f32) = (0.1, 2.0);
const PITCH_RANGE: (f32, f32) = (0.5, 2.0);

/// 输出音频编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    #[default]
    Mp3,
    Wav,
    Pcm,
}

impl AudioEncoding {
    /// 文件扩展名，同时也是协议里 `encoding` 字段的取值
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioEncoding {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "pcm" => Ok(Self::Pcm),
            _ => Err(RequestError::UnsupportedEncoding(s.to_string())),
        }
    }
}

/// 合成请求
///
/// 不变量:
/// - 构造后不可变（字段私有，只读访问）
/// - 文本非空且不超过长度上限
/// - speed/volume/pitch 在各自区间内
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    text: String,
    voice_id: String,
    speed: f32,
    volume: f32,
    pitch: f32,
    encoding: AudioEncoding,
    emotion: Option<String>,
    sample_rate: u32,
    bitrate: u32,
}

impl SynthesisRequest {
    pub fn builder(text: impl Into<String>, voice_id: impl Into<String>) -> SynthesisRequestBuilder {
        SynthesisRequestBuilder::new(text, voice_id)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn emotion(&self) -> Option<&str> {
        self.emotion.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// 参与缓存指纹计算的参数集合
    ///
    /// 只包含影响合成音频的字段，与请求 ID、调用方、时间无关
    pub fn fingerprint_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("text", self.text.clone()),
            ("voice_id", self.voice_id.clone()),
            ("speed", self.speed.to_string()),
            ("volume", self.volume.to_string()),
            ("pitch", self.pitch.to_string()),
            ("format", self.encoding.to_string()),
            (
                "emotion",
                self.emotion
                    .clone()
                    .unwrap_or_else(|| NEUTRAL_EMOTION.to_string()),
            ),
            ("sample_rate", self.sample_rate.to_string()),
            ("bitrate", self.bitrate.to_string()),
        ]
    }
}

/// 合成请求构建器
#[derive(Debug, Clone)]
pub struct SynthesisRequestBuilder {
    text: String,
    voice_id: String,
    speed: f32,
    volume: f32,
    pitch: f32,
    encoding: AudioEncoding,
    emotion: Option<String>,
    sample_rate: u32,
    bitrate: u32,
    max_text_length: usize,
}

impl SynthesisRequestBuilder {
    pub fn new(text: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            speed: 1.0,
            volume: 1.0,
            pitch: 1.0,
            encoding: AudioEncoding::default(),
            emotion: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bitrate: DEFAULT_BITRATE_KBPS,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// 空字符串视为未指定
    pub fn emotion(mut self, emotion: Option<impl Into<String>>) -> Self {
        self.emotion = emotion.map(Into::into).filter(|e| !e.trim().is_empty());
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    pub fn build(self) -> Result<SynthesisRequest, RequestError> {
        if self.text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }
        let len = self.text.chars().count();
        if len > self.max_text_length {
            return Err(RequestError::TextTooLong {
                len,
                max: self.max_text_length,
            });
        }
        if self.voice_id.trim().is_empty() {
            return Err(RequestError::EmptyVoice);
        }

        check_ratio("speed", self.speed, SPEED_RANGE)?;
        check_ratio("volume", self.volume, VOLUME_RANGE)?;
        check_ratio("pitch", self.pitch, PITCH_RANGE)?;

        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(RequestError::UnsupportedSampleRate(self.sample_rate));
        }
        if self.bitrate == 0 {
            return Err(RequestError::InvalidBitrate);
        }

        Ok(SynthesisRequest {
            text: self.text,
            voice_id: self.voice_id,
            speed: self.speed,
            volume: self.volume,
            pitch: self.pitch,
            encoding: self.encoding,
            emotion: self.emotion,
            sample_rate: self.sample_rate,
            bitrate: self.bitrate,
        })
    }
}

fn check_ratio(name: &'static str, value: f32, (min, max): (f32, f32)) -> Result<(), RequestError> {
    // NaN 不在任何区间内
    if !(min..=max).contains(&value) {
        return Err(RequestError::RatioOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = SynthesisRequest::builder("hello", "v1").build().unwrap();
        assert_eq!(request.speed(), 1.0);
        assert_eq!(request.volume(), 1.0);
        assert_eq!(request.pitch(), 1.0);
        assert_eq!(request.encoding(), AudioEncoding::Mp3);
        assert_eq!(request.sample_rate(), 24000);
        assert_eq!(request.bitrate(), 128);
        assert!(request.emotion().is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_input() {
        assert_eq!(
            SynthesisRequest::builder("   ", "v1").build().unwrap_err(),
            RequestError::EmptyText
        );
        assert_eq!(
            SynthesisRequest::builder("hi", "").build().unwrap_err(),
            RequestError::EmptyVoice
        );
        assert!(matches!(
            SynthesisRequest::builder("hi", "v1").speed(3.0).build(),
            Err(RequestError::RatioOutOfRange { name: "speed", .. })
        ));
        assert!(matches!(
            SynthesisRequest::builder("hi", "v1").volume(f32::NAN).build(),
            Err(RequestError::RatioOutOfRange { name: "volume", .. })
        ));
        assert_eq!(
            SynthesisRequest::builder("hi", "v1").sample_rate(12345).build().unwrap_err(),
            RequestError::UnsupportedSampleRate(12345)
        );
    }

    #[test]
    fn test_text_length_counts_chars() {
        let text = "语".repeat(10);
        assert!(SynthesisRequest::builder(text.clone(), "v1")
            .max_text_length(10)
            .build()
            .is_ok());
        assert_eq!(
            SynthesisRequest::builder(text, "v1")
                .max_text_length(9)
                .build()
                .unwrap_err(),
            RequestError::TextTooLong { len: 10, max: 9 }
        );
    }

    #[test]
    fn test_blank_emotion_is_dropped() {
        let request = SynthesisRequest::builder("hi", "v1")
            .emotion(Some(" "))
            .build()
            .unwrap();
        assert!(request.emotion().is_none());

        let params = request.fingerprint_params();
        assert!(params.contains(&("emotion", "neutral".to_string())));
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!("MP3".parse::<AudioEncoding>().unwrap(), AudioEncoding::Mp3);
        assert_eq!("pcm".parse::<AudioEncoding>().unwrap(), AudioEncoding::Pcm);
        assert!("ogg".parse::<AudioEncoding>().is_err());
    }
}
