//! Query Handlers 实现

mod cache_handlers;
mod voice_handlers;

pub use cache_handlers::*;
pub use voice_handlers::*;
