pub mod list_cache;
pub mod redis_cache;

pub use list_cache::{CacheKeys, CacheStats, CachedList, ListCache, MemoryListCache};
pub use redis_cache::RedisListCache;
