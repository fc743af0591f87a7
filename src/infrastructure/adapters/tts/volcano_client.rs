//! Volcano TTS Client - 火山引擎流式合成客户端
//!
//! 实现 TtsEnginePort trait，通过二进制 WebSocket 协议调用火山引擎 TTS
//!
//! 外部 TTS API:
//! WSS wss://openspeech.bytedance.com/api/v1/tts/ws_binary
//! Header: Authorization: Bearer; <token>
//! Request: 单个完整请求帧（gzip JSON）
//! Response: 音频块帧序列，负序号表示结束；或一个错误帧

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::frame::{self, ServerMessage};
use crate::application::ports::{AudioStream, TtsEnginePort, TtsError, VoiceCatalogPort};
use crate::domain::synthesis::SynthesisRequest;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连通性检查使用的文本
const HEALTH_CHECK_TEXT: &str = "测试连接";

// ============================================================================
// Wire format
// ============================================================================

/// 请求 JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub app: WireApp,
    pub user: WireUser,
    pub audio: WireAudio,
    pub request: WireRequestBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireApp {
    pub appid: String,
    pub token: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireUser {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAudio {
    pub voice_type: String,
    pub encoding: String,
    pub speed_ratio: f32,
    pub volume_ratio: f32,
    pub pitch_ratio: f32,
    pub rate: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequestBody {
    pub reqid: String,
    pub text: String,
    pub text_type: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// 火山引擎客户端配置
#[derive(Debug, Clone)]
pub struct VolcanoClientConfig {
    pub app_id: String,
    pub access_token: String,
    pub cluster: String,
    pub host: String,
    /// 完整的 WebSocket 地址，设置后忽略 host
    pub endpoint: Option<String>,
    /// 单次接收超时
    pub recv_timeout: Duration,
    /// 整次调用的截止时间
    pub call_timeout: Duration,
    /// 连通性检查使用的音色
    pub default_voice: String,
}

impl Default for VolcanoClientConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            access_token: String::new(),
            cluster: "volcano_tts".to_string(),
            host: "openspeech.bytedance.com".to_string(),
            endpoint: None,
            recv_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(120),
            default_voice: "zh_female_shuangkuaisisi_emo_v2_mars_bigtts".to_string(),
        }
    }
}

impl VolcanoClientConfig {
    pub fn url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("wss://{}/api/v1/tts/ws_binary", self.host))
    }
}

/// 火山引擎流式合成客户端
///
/// 每次调用建立独立连接，不复用
pub struct VolcanoTtsClient {
    config: VolcanoClientConfig,
    catalog: Arc<dyn VoiceCatalogPort>,
}

impl VolcanoTtsClient {
    pub fn new(config: VolcanoClientConfig, catalog: Arc<dyn VoiceCatalogPort>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &VolcanoClientConfig {
        &self.config
    }

    /// 构建请求 JSON
    ///
    /// 情感参数仅在音色支持时携带，不支持时静默忽略
    pub fn build_request(&self, request: &SynthesisRequest) -> WireRequest {
        let emotion = match request.emotion() {
            Some(emotion) if self.catalog.supports_emotion(request.voice_id()) => {
                tracing::debug!(
                    voice_id = %request.voice_id(),
                    emotion = %emotion,
                    "Emotion applied"
                );
                Some(emotion.to_string())
            }
            Some(emotion) => {
                tracing::debug!(
                    voice_id = %request.voice_id(),
                    emotion = %emotion,
                    "Voice does not support emotion, omitting"
                );
                None
            }
            None => None,
        };

        WireRequest {
            app: WireApp {
                appid: self.config.app_id.clone(),
                token: self.config.access_token.clone(),
                cluster: self.config.cluster.clone(),
            },
            user: WireUser {
                uid: Uuid::new_v4().to_string(),
            },
            audio: WireAudio {
                voice_type: request.voice_id().to_string(),
                encoding: request.encoding().extension().to_string(),
                speed_ratio: request.speed(),
                volume_ratio: request.volume(),
                pitch_ratio: request.pitch(),
                rate: request.sample_rate(),
                bitrate: request.bitrate(),
            },
            request: WireRequestBody {
                reqid: Uuid::new_v4().to_string(),
                text: request.text().to_string(),
                text_type: "plain".to_string(),
                operation: "submit".to_string(),
                emotion,
            },
        }
    }

    async fn connect(&self) -> Result<WsStream, TtsError> {
        let url = self.config.url();
        let mut ws_request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TtsError::Connection(format!("invalid endpoint {}: {}", url, e)))?;

        let auth = HeaderValue::from_str(&format!("Bearer; {}", self.config.access_token))
            .map_err(|e| TtsError::Connection(format!("invalid access token: {}", e)))?;
        ws_request.headers_mut().insert("Authorization", auth);

        let (ws, _response) = timeout(self.config.recv_timeout, connect_async(ws_request))
            .await
            .map_err(|_| TtsError::Connection(format!("connect to {} timed out", url)))?
            .map_err(|e| TtsError::Connection(format!("connect to {} failed: {}", url, e)))?;

        tracing::debug!(url = %url, "Connected to TTS provider");
        Ok(ws)
    }
}

/// 接收循环
///
/// 收到终止块后正常结束；超时、断开或未知错误以 `Incomplete` 结束
fn receive(mut ws: WsStream, reqid: String, recv_timeout: Duration, deadline: Instant) -> AudioStream {
    let stream = async_stream::stream! {
        let mut chunks = 0usize;
        let mut bytes = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                yield Err(TtsError::Incomplete("call deadline exceeded".to_string()));
                break;
            }
            let wait = recv_timeout.min(remaining);

            let message = match timeout(wait, ws.next()).await {
                Err(_) => {
                    yield Err(TtsError::Incomplete(format!("no frame within {:?}", wait)));
                    break;
                }
                Ok(None) => {
                    yield Err(TtsError::Incomplete("connection closed before final chunk".to_string()));
                    break;
                }
                Ok(Some(Err(e))) => {
                    yield Err(TtsError::Incomplete(format!("connection lost: {}", e)));
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };

            let data = match message {
                Message::Binary(data) => data,
                Message::Close(_) => {
                    yield Err(TtsError::Incomplete("provider closed before final chunk".to_string()));
                    break;
                }
                _ => continue,
            };

            let parsed = frame::decode(&data).and_then(|f| frame::parse_server_message(&f));
            match parsed {
                Ok(ServerMessage::Audio(chunk)) => {
                    let last = chunk.is_last();
                    tracing::debug!(
                        reqid = %reqid,
                        sequence = chunk.sequence,
                        size_bytes = chunk.data.len(),
                        "Audio chunk received"
                    );
                    if !chunk.data.is_empty() {
                        chunks += 1;
                        bytes += chunk.data.len();
                        yield Ok(chunk.data);
                    }
                    if last {
                        tracing::debug!(reqid = %reqid, chunks = chunks, size_bytes = bytes, "Stream finished");
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                Ok(ServerMessage::NoData) => continue,
                Ok(ServerMessage::Frontend(payload)) => {
                    tracing::debug!(reqid = %reqid, size_bytes = payload.len(), "Frontend notice received");
                }
                Ok(ServerMessage::Unknown(message_type)) => {
                    tracing::debug!(reqid = %reqid, message_type = message_type, "Ignoring unknown message type");
                }
                Ok(ServerMessage::Error { code, message }) => {
                    tracing::error!(reqid = %reqid, code = code, message = %message, "Provider rejected request");
                    let _ = ws.close(None).await;
                    yield Err(TtsError::Provider { code, message });
                    break;
                }
                Err(e) => {
                    tracing::error!(reqid = %reqid, error = %e, "Malformed frame from provider");
                    yield Err(e.into());
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

#[async_trait]
impl TtsEnginePort for VolcanoTtsClient {
    async fn stream(&self, request: &SynthesisRequest) -> Result<AudioStream, TtsError> {
        let deadline = Instant::now() + self.config.call_timeout;
        let wire = self.build_request(request);
        let payload = frame::encode_request(&wire)?;

        tracing::debug!(
            reqid = %wire.request.reqid,
            voice_id = %wire.audio.voice_type,
            text_len = request.text().chars().count(),
            emotion = ?wire.request.emotion,
            "Sending TTS request"
        );

        let mut ws = self.connect().await?;
        ws.send(Message::Binary(payload.into()))
            .await
            .map_err(|e| TtsError::Connection(format!("send request failed: {}", e)))?;

        Ok(receive(
            ws,
            wire.request.reqid,
            self.config.recv_timeout,
            deadline,
        ))
    }

    async fn health_check(&self) -> bool {
        let request = match SynthesisRequest::builder(HEALTH_CHECK_TEXT, &self.config.default_voice).build() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Health check request invalid");
                return false;
            }
        };

        let mut stream = match self.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "TTS provider unreachable");
                return false;
            }
        };

        while let Some(chunk) = stream.next().await {
            if let Err(e) = chunk {
                tracing::warn!(error = %e, "TTS provider health check failed");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::catalog::VoiceCatalogRegistry;
    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const EMOTION_VOICE: &str = "zh_female_shuangkuaisisi_emo_v2_mars_bigtts";

    enum Step {
        Send(Vec<u8>),
        Stall(Duration),
        Close,
    }

    /// 本地模拟服务端：记录鉴权头与请求，按脚本回复
    async fn serve(script: Vec<Step>) -> (String, JoinHandle<(Option<String>, WireRequest)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut auth = None;
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                auth = req
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                Ok(resp)
            };
            let ws = accept_hdr_async(stream, callback).await.unwrap();

            let (mut write, mut read) = ws.split();
            let message = read.next().await.unwrap().unwrap();
            let request: WireRequest = frame::decode_request(&message.into_data()).unwrap();

            for step in script {
                match step {
                    Step::Send(data) => {
                        let _ = write.send(Message::Binary(data.into())).await;
                    }
                    Step::Stall(d) => tokio::time::sleep(d).await,
                    Step::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            (auth, request)
        });

        (format!("ws://{}", addr), handle)
    }

    fn client(endpoint: Option<String>, recv_timeout: Duration) -> VolcanoTtsClient {
        let config = VolcanoClientConfig {
            app_id: "app".to_string(),
            access_token: "secret".to_string(),
            endpoint,
            recv_timeout,
            ..Default::default()
        };
        let catalog = Arc::new(VoiceCatalogRegistry::new(None, EMOTION_VOICE));
        VolcanoTtsClient::new(config, catalog)
    }

    fn request(voice: &str, emotion: Option<&str>) -> SynthesisRequest {
        SynthesisRequest::builder("你好", voice)
            .speed(1.2)
            .emotion(emotion)
            .build()
            .unwrap()
    }

    async fn collect(stream: AudioStream) -> Vec<Result<Bytes, TtsError>> {
        stream.collect().await
    }

    #[test]
    fn test_emotion_gated_by_capability() {
        let client = client(None, Duration::from_secs(1));

        let wire = client.build_request(&request(EMOTION_VOICE, Some("happy")));
        assert_eq!(wire.request.emotion.as_deref(), Some("happy"));

        let wire = client.build_request(&request("generic_voice_01", Some("happy")));
        assert_eq!(wire.request.emotion, None);
    }

    #[test]
    fn test_wire_request_round_trip() {
        let client = client(None, Duration::from_secs(1));
        let wire = client.build_request(&request(EMOTION_VOICE, Some("happy")));

        let decoded: WireRequest =
            frame::decode_request(&frame::encode_request(&wire).unwrap()).unwrap();
        assert_eq!(decoded, wire);
        assert_eq!(decoded.audio.voice_type, EMOTION_VOICE);
        assert_eq!(decoded.audio.speed_ratio, 1.2);
        assert_eq!(decoded.audio.encoding, "mp3");
        assert_eq!(decoded.request.operation, "submit");
    }

    #[test]
    fn test_default_url() {
        let config = VolcanoClientConfig::default();
        assert_eq!(
            config.url(),
            "wss://openspeech.bytedance.com/api/v1/tts/ws_binary"
        );
    }

    #[tokio::test]
    async fn test_stream_until_terminal_chunk() {
        let (url, server) = serve(vec![
            Step::Send(frame::encode_ack_response()),
            Step::Send(frame::encode_audio_response(1, b"ab")),
            Step::Send(frame::encode_audio_response(2, b"cd")),
            Step::Send(frame::encode_audio_response(-3, b"ef")),
        ])
        .await;

        let client = client(Some(url), Duration::from_secs(2));
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let chunks: Vec<Bytes> = collect(stream)
            .await
            .into_iter()
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(chunks, vec![Bytes::from("ab"), Bytes::from("cd"), Bytes::from("ef")]);

        let (auth, wire) = server.await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer; secret"));
        assert_eq!(wire.app.appid, "app");
        assert_eq!(wire.request.text, "你好");
    }

    #[tokio::test]
    async fn test_close_before_terminal_is_incomplete() {
        let (url, _server) = serve(vec![
            Step::Send(frame::encode_audio_response(1, b"ab")),
            Step::Close,
        ])
        .await;

        let client = client(Some(url), Duration::from_secs(2));
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(TtsError::Incomplete(_))));
    }

    #[tokio::test]
    async fn test_receive_timeout_is_incomplete() {
        let (url, _server) = serve(vec![Step::Stall(Duration::from_secs(2))]).await;

        let client = client(Some(url), Duration::from_millis(200));
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TtsError::Incomplete(_))));
    }

    #[tokio::test]
    async fn test_call_deadline_ends_steady_stream() {
        // 每 100ms 一块，始终在单次接收超时之内，但没有终止块
        let mut script = Vec::new();
        for sequence in 1..=20 {
            script.push(Step::Send(frame::encode_audio_response(sequence, b"ab")));
            script.push(Step::Stall(Duration::from_millis(100)));
        }
        let (url, _server) = serve(script).await;

        let config = VolcanoClientConfig {
            access_token: "secret".to_string(),
            endpoint: Some(url),
            recv_timeout: Duration::from_millis(500),
            call_timeout: Duration::from_millis(350),
            ..Default::default()
        };
        let catalog = Arc::new(VoiceCatalogRegistry::new(None, EMOTION_VOICE));
        let client = VolcanoTtsClient::new(config, catalog);

        let started = std::time::Instant::now();
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let items = collect(stream).await;

        assert!(started.elapsed() < Duration::from_millis(1500));
        assert!(items.len() >= 2);
        assert!(items[..items.len() - 1].iter().all(|item| item.is_ok()));
        assert!(matches!(items.last(), Some(Err(TtsError::Incomplete(_)))));
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _request = ws.next().await.unwrap().unwrap();
            ws.send(Message::Binary(frame::encode_audio_response(1, b"ab").into()))
                .await
                .unwrap();

            // 不发终止块，等待客户端断开
            match timeout(Duration::from_secs(2), ws.next()).await {
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => true,
                _ => false,
            }
        });

        let client = client(Some(url), Duration::from_secs(5));
        let mut stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from("ab"));
        drop(stream);

        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_error_frame_aborts_stream() {
        let (url, _server) = serve(vec![
            Step::Send(frame::encode_error_response(45000, "invalid text", true).unwrap()),
            Step::Send(frame::encode_audio_response(-1, b"never")),
        ])
        .await;

        let client = client(Some(url), Duration::from_secs(2));
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            Err(TtsError::Provider { code: 45000, message }) if message == "invalid text"
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let (url, _server) = serve(vec![Step::Send(vec![0x11, 0xb1])]).await;

        let client = client(Some(url), Duration::from_secs(2));
        let stream = client.stream(&request(EMOTION_VOICE, None)).await.unwrap();
        let items = collect(stream).await;
        assert!(matches!(items[0], Err(TtsError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (url, _server) = serve(vec![Step::Send(frame::encode_audio_response(-1, b"ok"))]).await;
        assert!(client(Some(url), Duration::from_secs(2)).health_check().await);

        // 没有服务在监听
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client(Some(format!("ws://{}", addr)), Duration::from_secs(1));
        assert!(!client.health_check().await);
    }
}
