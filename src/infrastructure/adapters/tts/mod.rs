//! TTS Adapter - 火山引擎二进制 WebSocket 协议
//!
//! - frame: 帧头与负载的编解码
//! - volcano_client: 流式合成客户端

pub mod frame;
mod volcano_client;

pub use frame::{AudioChunk, FrameError, FrameHeader, MessageType, ProtocolFrame, ServerMessage};
pub use volcano_client::{
    VolcanoClientConfig, VolcanoTtsClient, WireApp, WireAudio, WireRequest, WireRequestBody,
    WireUser,
};
