//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：音色目录与缓存统计

mod cache_queries;
mod voice_queries;

pub mod handlers;

pub use cache_queries::*;
pub use voice_queries::*;
