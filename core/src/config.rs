//! Cache configuration
//!
//! A configuration record with defaults, optionally loaded from environment
//! variables. Values that fail to parse are ignored and the defaults apply.

use std::env;
use std::time::Duration;

/// Default memory capacity: 64 MiB.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default auto-flush period and idle window.
pub const DEFAULT_AUTO_FLUSH_INTERVAL: Duration = Duration::from_millis(2500);

/// Construction-time options for a [`TileCache`](crate::TileCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Memory capacity in bytes
    pub memory_capacity: u64,
    /// Write payloads through to disk at admission time
    pub write_through: bool,
    /// Start the auto-flush scheduler at construction
    pub auto_flush: bool,
    /// Auto-flush period and idle window (must be non-zero)
    pub auto_flush_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            write_through: false,
            auto_flush: false,
            auto_flush_interval: DEFAULT_AUTO_FLUSH_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("TILE_CACHE_MEMORY_CAPACITY")
            && let Ok(bytes) = val.parse::<u64>()
        {
            config.memory_capacity = bytes;
        }
        if let Ok(val) = env::var("TILE_CACHE_WRITE_THROUGH") {
            config.write_through = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("TILE_CACHE_AUTO_FLUSH") {
            config.auto_flush = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("TILE_CACHE_AUTO_FLUSH_INTERVAL_MS")
            && let Ok(ms) = val.parse::<u64>()
            && ms > 0
        {
            config.auto_flush_interval = Duration::from_millis(ms);
        }

        config
    }
}
