//! Cache Queries

/// 获取缓存统计
#[derive(Debug, Clone, Default)]
pub struct GetCacheStats;
