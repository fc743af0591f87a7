//! Frame Codec - 二进制帧编解码
//!
//! 帧格式: `[4 字节帧头][负载]`
//!
//! 帧头各字段按半字节打包:
//! - byte0: 协议版本 (高 4 位) | 帧头长度，单位 4 字节 (低 4 位)
//! - byte1: 消息类型 (高 4 位) | 类型相关标志 (低 4 位)
//! - byte2: 序列化方式 (高 4 位) | 压缩方式 (低 4 位)
//! - byte3: 保留
//!
//! 客户端请求的负载为 `[4 字节大端长度][gzip(JSON)]`

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

use crate::application::ports::TtsError;

/// 协议版本
pub const PROTOCOL_VERSION: u8 = 0b0001;
/// 默认帧头长度（以 4 字节为单位）
pub const HEADER_WORDS: u8 = 0b0001;

/// 序列化方式: 无
pub const SERIALIZATION_NONE: u8 = 0b0000;
/// 序列化方式: JSON
pub const SERIALIZATION_JSON: u8 = 0b0001;
/// 压缩方式: 无
pub const COMPRESSION_NONE: u8 = 0b0000;
/// 压缩方式: gzip
pub const COMPRESSION_GZIP: u8 = 0b0001;

/// 帧解码错误
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("header length {header_len} exceeds frame length {frame_len}")]
    HeaderOverflow { header_len: usize, frame_len: usize },

    #[error("truncated {0} payload")]
    Truncated(&'static str),

    #[error("payload decompression failed: {0}")]
    Compression(String),

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl From<FrameError> for TtsError {
    fn from(err: FrameError) -> Self {
        TtsError::MalformedFrame(err.to_string())
    }
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// 客户端完整请求
    FullClientRequest,
    /// 服务端音频块
    AudioOnlyResponse,
    /// 服务端前端信息（文本分析结果等）
    FrontendResponse,
    /// 服务端错误
    Error,
    Other(u8),
}

impl MessageType {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0x1 => Self::FullClientRequest,
            0xb => Self::AudioOnlyResponse,
            0xc => Self::FrontendResponse,
            0xf => Self::Error,
            other => Self::Other(other),
        }
    }

    pub fn nibble(&self) -> u8 {
        match self {
            Self::FullClientRequest => 0x1,
            Self::AudioOnlyResponse => 0xb,
            Self::FrontendResponse => 0xc,
            Self::Error => 0xf,
            Self::Other(value) => *value & 0x0f,
        }
    }
}

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub header_words: u8,
    pub message_type: MessageType,
    pub flags: u8,
    pub serialization: u8,
    pub compression: u8,
    pub reserved: u8,
}

impl FrameHeader {
    /// 客户端完整请求的帧头: JSON + gzip
    pub fn full_client_request() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            header_words: HEADER_WORDS,
            message_type: MessageType::FullClientRequest,
            flags: 0,
            serialization: SERIALIZATION_JSON,
            compression: COMPRESSION_GZIP,
            reserved: 0,
        }
    }

    /// 帧头长度（字节）
    pub fn header_len(&self) -> usize {
        self.header_words as usize * 4
    }

    pub fn is_gzip(&self) -> bool {
        self.compression == COMPRESSION_GZIP
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            (self.version << 4) | (self.header_words & 0x0f),
            (self.message_type.nibble() << 4) | (self.flags & 0x0f),
            (self.serialization << 4) | (self.compression & 0x0f),
            self.reserved,
        ]
    }

    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < 4 {
            return Err(FrameError::TooShort(data.len()));
        }
        Ok(Self {
            version: data[0] >> 4,
            header_words: data[0] & 0x0f,
            message_type: MessageType::from_nibble(data[1] >> 4),
            flags: data[1] & 0x0f,
            serialization: data[2] >> 4,
            compression: data[2] & 0x0f,
            reserved: data[3],
        })
    }
}

/// 一个完整的协议帧，负载紧跟在帧头之后
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolFrame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

/// 音频块
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sequence: i32,
    pub data: Bytes,
}

impl AudioChunk {
    /// 负序号表示流的最后一块
    pub fn is_last(&self) -> bool {
        self.sequence < 0
    }
}

/// 解析后的服务端消息
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Audio(AudioChunk),
    /// 标志位为 0 的音频帧，不携带数据也不表示结束
    NoData,
    Frontend(Bytes),
    Error { code: u32, message: String },
    Unknown(u8),
}

// ============================================================================
// Encoding
// ============================================================================

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder
        .write_all(data)
        .map_err(|e| FrameError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| FrameError::Compression(e.to_string()))
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FrameError::Compression(e.to_string()))?;
    Ok(out)
}

/// 编码客户端完整请求: JSON 序列化、gzip 压缩、加帧头和长度前缀
pub fn encode_request<T: Serialize>(request: &T) -> Result<Vec<u8>, FrameError> {
    let json = serde_json::to_vec(request).map_err(|e| FrameError::Serialization(e.to_string()))?;
    let payload = gzip(&json)?;

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&FrameHeader::full_client_request().to_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// 解码客户端完整请求，`encode_request` 的逆操作
pub fn decode_request<T: DeserializeOwned>(data: &[u8]) -> Result<T, FrameError> {
    let frame = decode(data)?;
    let (len, body) = read_u32(&frame.payload, "request")?;
    let body = body
        .get(..len as usize)
        .ok_or(FrameError::Truncated("request"))?;
    let json = if frame.header.is_gzip() {
        gunzip(body)?
    } else {
        body.to_vec()
    };
    serde_json::from_slice(&json).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// 编码服务端音频帧；`sequence` 为负表示最后一块
pub fn encode_audio_response(sequence: i32, audio: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        message_type: MessageType::AudioOnlyResponse,
        flags: if sequence < 0 { 0b0011 } else { 0b0001 },
        serialization: SERIALIZATION_NONE,
        compression: COMPRESSION_NONE,
        ..FrameHeader::full_client_request()
    };
    let mut frame = Vec::with_capacity(12 + audio.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&sequence.to_be_bytes());
    frame.extend_from_slice(&(audio.len() as u32).to_be_bytes());
    frame.extend_from_slice(audio);
    frame
}

/// 编码服务端确认帧（标志位为 0，不带数据）
pub fn encode_ack_response() -> Vec<u8> {
    let header = FrameHeader {
        message_type: MessageType::AudioOnlyResponse,
        flags: 0,
        serialization: SERIALIZATION_NONE,
        compression: COMPRESSION_NONE,
        ..FrameHeader::full_client_request()
    };
    header.to_bytes().to_vec()
}

/// 编码服务端错误帧，消息按需 gzip 压缩
pub fn encode_error_response(code: u32, message: &str, compress: bool) -> Result<Vec<u8>, FrameError> {
    let body = if compress {
        gzip(message.as_bytes())?
    } else {
        message.as_bytes().to_vec()
    };
    let header = FrameHeader {
        message_type: MessageType::Error,
        flags: 0,
        compression: if compress { COMPRESSION_GZIP } else { COMPRESSION_NONE },
        ..FrameHeader::full_client_request()
    };
    let mut frame = Vec::with_capacity(12 + body.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(&code.to_be_bytes());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

// ============================================================================
// Decoding
// ============================================================================

/// 拆分帧头与负载
pub fn decode(data: &[u8]) -> Result<ProtocolFrame, FrameError> {
    let header = FrameHeader::parse(data)?;
    let header_len = header.header_len();
    if header_len < 4 || header_len > data.len() {
        return Err(FrameError::HeaderOverflow {
            header_len,
            frame_len: data.len(),
        });
    }

    Ok(ProtocolFrame {
        header,
        payload: Bytes::copy_from_slice(&data[header_len..]),
    })
}

fn read_u32<'a>(data: &'a [u8], what: &'static str) -> Result<(u32, &'a [u8]), FrameError> {
    if data.len() < 4 {
        return Err(FrameError::Truncated(what));
    }
    let value = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    Ok((value, &data[4..]))
}

/// 按消息类型解析负载
pub fn parse_server_message(frame: &ProtocolFrame) -> Result<ServerMessage, FrameError> {
    let payload = &frame.payload[..];

    match frame.header.message_type {
        MessageType::AudioOnlyResponse => {
            if frame.header.flags == 0 {
                return Ok(ServerMessage::NoData);
            }
            let (sequence, rest) = read_u32(payload, "audio")?;
            // 声明长度仅作参考，剩余字节全部视为音频
            let (_declared, audio) = read_u32(rest, "audio")?;
            Ok(ServerMessage::Audio(AudioChunk {
                sequence: sequence as i32,
                data: frame.payload.slice(payload.len() - audio.len()..),
            }))
        }
        MessageType::FrontendResponse => {
            let (_size, body) = read_u32(payload, "frontend")?;
            let body = if frame.header.is_gzip() {
                Bytes::from(gunzip(body)?)
            } else {
                frame.payload.slice(4..)
            };
            Ok(ServerMessage::Frontend(body))
        }
        MessageType::Error => {
            let (code, rest) = read_u32(payload, "error")?;
            let (size, body) = read_u32(rest, "error")?;
            let body = body.get(..size as usize).unwrap_or(body);
            let message = if frame.header.is_gzip() {
                gunzip(body)?
            } else {
                body.to_vec()
            };
            Ok(ServerMessage::Error {
                code,
                message: String::from_utf8_lossy(&message).into_owned(),
            })
        }
        MessageType::FullClientRequest => Ok(ServerMessage::Unknown(
            MessageType::FullClientRequest.nibble(),
        )),
        MessageType::Other(value) => Ok(ServerMessage::Unknown(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_request_header_bytes() {
        let frame = encode_request(&json!({"a": 1})).unwrap();
        assert_eq!(&frame[..4], &[0x11, 0x10, 0x11, 0x00]);

        let len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
        assert_eq!(len, frame.len() - 8);
    }

    #[test]
    fn test_request_round_trip() {
        let request = json!({
            "audio": {"voice_type": "v1", "speed_ratio": 1.2, "encoding": "wav"},
            "request": {"text": "你好", "emotion": "happy"}
        });
        let frame = encode_request(&request).unwrap();
        let decoded: Value = decode_request(&frame).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_short_frame_is_malformed() {
        assert!(matches!(decode(&[0x11, 0xb1, 0x00]), Err(FrameError::TooShort(3))));
        assert!(matches!(decode(&[]), Err(FrameError::TooShort(0))));

        let err: TtsError = decode(&[0x11]).unwrap_err().into();
        assert!(matches!(err, TtsError::MalformedFrame(_)));
    }

    #[test]
    fn test_header_longer_than_frame() {
        // 帧头声明 3 个字（12 字节），实际只有 6 字节
        let err = decode(&[0x13, 0xb1, 0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::HeaderOverflow { header_len: 12, frame_len: 6 }
        ));
    }

    #[test]
    fn test_extended_header_is_skipped() {
        let mut data = vec![0x12, 0xb1, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd];
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(b"xyz");

        let frame = decode(&data).unwrap();
        assert_eq!(frame.header.header_len(), 8);
        match parse_server_message(&frame).unwrap() {
            ServerMessage::Audio(chunk) => {
                assert_eq!(chunk.sequence, 1);
                assert_eq!(&chunk.data[..], b"xyz");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_audio_frames() {
        let frame = decode(&encode_audio_response(2, b"abc")).unwrap();
        let ServerMessage::Audio(chunk) = parse_server_message(&frame).unwrap() else {
            panic!("expected audio");
        };
        assert!(!chunk.is_last());
        assert_eq!(&chunk.data[..], b"abc");

        let frame = decode(&encode_audio_response(-3, b"end")).unwrap();
        let ServerMessage::Audio(chunk) = parse_server_message(&frame).unwrap() else {
            panic!("expected audio");
        };
        assert!(chunk.is_last());
        assert_eq!(chunk.sequence, -3);

        let frame = decode(&encode_ack_response()).unwrap();
        assert_eq!(parse_server_message(&frame).unwrap(), ServerMessage::NoData);
    }

    #[test]
    fn test_error_frames() {
        for compress in [true, false] {
            let data = encode_error_response(45000, "invalid text", compress).unwrap();
            let frame = decode(&data).unwrap();
            assert_eq!(
                parse_server_message(&frame).unwrap(),
                ServerMessage::Error {
                    code: 45000,
                    message: "invalid text".to_string()
                }
            );
        }
    }

    #[test]
    fn test_truncated_audio_payload() {
        let frame = decode(&[0x11, 0xb1, 0x00, 0x00, 0x00, 0x01]).unwrap();
        assert!(matches!(
            parse_server_message(&frame),
            Err(FrameError::Truncated("audio"))
        ));
    }

    #[test]
    fn test_unknown_message_type() {
        let frame = decode(&[0x11, 0x90, 0x00, 0x00]).unwrap();
        assert_eq!(parse_server_message(&frame).unwrap(), ServerMessage::Unknown(0x9));
    }
}
