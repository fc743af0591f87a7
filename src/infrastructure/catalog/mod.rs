//! Catalog Layer - 音色目录与情感能力表

mod registry;

pub use registry::{CatalogLoadError, VoiceCatalogRegistry, VOICE_PRESETS_FILE};
