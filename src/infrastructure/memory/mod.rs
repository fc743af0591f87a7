//! Memory Layer - In-Memory State Management
//!
//! 进程内合成缓存

mod synthesis_cache;

pub use synthesis_cache::InMemorySynthesisCache;
