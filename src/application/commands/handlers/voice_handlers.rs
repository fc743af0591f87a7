//! Voice Command Handlers

use std::sync::Arc;

use crate::application::commands::ReloadVoices;
use crate::application::ports::{CatalogSource, VoiceCatalogPort};

/// 重新加载响应
#[derive(Debug, Clone)]
pub struct ReloadVoicesResponse {
    pub source: CatalogSource,
    pub voice_count: usize,
    pub emotion_voice_count: usize,
}

/// ReloadVoices Handler
pub struct ReloadVoicesHandler {
    catalog: Arc<dyn VoiceCatalogPort>,
}

impl ReloadVoicesHandler {
    pub fn new(catalog: Arc<dyn VoiceCatalogPort>) -> Self {
        Self { catalog }
    }

    pub fn handle(&self, _command: ReloadVoices) -> ReloadVoicesResponse {
        let source = self.catalog.reload();
        let snapshot = self.catalog.snapshot();

        tracing::info!(
            source = ?source,
            voices = snapshot.voice_count(),
            emotion_voices = snapshot.emotion_voices().len(),
            "Voice catalog reloaded"
        );

        ReloadVoicesResponse {
            source,
            voice_count: snapshot.voice_count(),
            emotion_voice_count: snapshot.emotion_voices().len(),
        }
    }
}
