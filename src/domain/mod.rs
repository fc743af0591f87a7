//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Synthesis Context: 合成请求与合成结果
//! - Catalog Context: 音色目录与情感能力

pub mod catalog;
pub mod synthesis;
