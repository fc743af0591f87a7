//! Worker Layer - Background Task Processing
//!
//! 实现 CacheSweeper，定期清理过期缓存与音频文件

mod cache_sweeper;

pub use cache_sweeper::{CacheSweeper, CacheSweeperConfig};
