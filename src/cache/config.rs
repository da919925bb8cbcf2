//! Cache sizing and expiry presets.

use std::time::Duration;

/// Size and expiry of one cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_capacity: u64,
    /// Entries expire this long after insertion.
    pub ttl: Option<Duration>,
    /// Entries expire after going unread this long.
    pub tti: Option<Duration>,
}

impl CacheConfig {
    /// Staff lookups. Short TTL so edits to users.json apply quickly.
    pub fn staff_lookup() -> Self {
        Self {
            max_capacity: 500,
            ttl: Some(Duration::from_secs(30)),
            tti: None,
        }
    }

    /// Collection lists kept while a user pages through them.
    pub fn browse_session() -> Self {
        Self {
            max_capacity: 200,
            ttl: Some(Duration::from_secs(1800)), // 30 minutes max
            tti: Some(Duration::from_secs(600)),  // 10 minutes idle
        }
    }
}
