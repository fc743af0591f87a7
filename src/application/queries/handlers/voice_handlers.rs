//! Voice Query Handlers

use serde::Serialize;
use std::sync::Arc;

use crate::application::error::SynthesisError;
use crate::application::ports::VoiceCatalogPort;
use crate::application::queries::{GetVoice, ListVoices};
use crate::domain::catalog::{VoiceCategory, VoiceInfo};

// ============================================================================
// Response DTOs
// ============================================================================

/// 音色列表响应
#[derive(Debug, Clone, Serialize)]
pub struct VoiceListResponse {
    pub categories: Vec<VoiceCategory>,
    pub total_count: usize,
    pub emotion_voices: Vec<String>,
}

/// 音色详情响应
#[derive(Debug, Clone, Serialize)]
pub struct VoiceDetailResponse {
    #[serde(flatten)]
    pub voice: VoiceInfo,
    pub supports_emotion: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// ListVoices Handler
pub struct ListVoicesHandler {
    catalog: Arc<dyn VoiceCatalogPort>,
}

impl ListVoicesHandler {
    pub fn new(catalog: Arc<dyn VoiceCatalogPort>) -> Self {
        Self { catalog }
    }

    pub fn handle(&self, query: ListVoices) -> VoiceListResponse {
        let snapshot = self.catalog.snapshot();
        let categories = snapshot.filter(&query.filter);
        let total_count = categories.iter().map(|c| c.voices.len()).sum();

        VoiceListResponse {
            categories,
            total_count,
            emotion_voices: snapshot.emotion_voices(),
        }
    }
}

/// GetVoice Handler
pub struct GetVoiceHandler {
    catalog: Arc<dyn VoiceCatalogPort>,
}

impl GetVoiceHandler {
    pub fn new(catalog: Arc<dyn VoiceCatalogPort>) -> Self {
        Self { catalog }
    }

    pub fn handle(&self, query: GetVoice) -> Result<VoiceDetailResponse, SynthesisError> {
        let snapshot = self.catalog.snapshot();
        let voice = snapshot
            .find(&query.voice_id)
            .cloned()
            .ok_or_else(|| SynthesisError::not_found("Voice", &query.voice_id))?;

        Ok(VoiceDetailResponse {
            supports_emotion: snapshot.supports_emotion(&voice.id),
            voice,
        })
    }
}
