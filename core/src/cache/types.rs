//! Cache-facing types: errors, lifecycle labels, observer and visitor
//! contracts, and statistics

use thiserror::Error;

use crate::tile::{DiskBackedTile, TileId};

/// Errors surfaced by cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("tile ({tile_x}, {tile_y}) is not resident")]
    TileNotResident { tile_x: i32, tile_y: i32 },

    #[error("disk cache I/O failed: {0}")]
    DiskCacheFailed(#[from] std::io::Error),

    #[error("cannot make room for {required} bytes with capacity {capacity}")]
    CapacityTooSmall { required: u64, capacity: u64 },
}

/// Lifecycle label of a tile.
///
/// | From | Event | To |
/// |---|---|---|
/// | — | added, fits in memory | `AddedResident` |
/// | — | added, cannot fit | `Added` |
/// | resident | evicted | `NonResident` |
/// | non-resident | re-read from disk | `Resident`, then `Accessed` |
/// | resident | served from memory | `Accessed` |
/// | any | removed or flushed | `Removed` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileAction {
    /// Added without becoming resident
    Added,
    /// Added and resident
    AddedResident,
    /// Promoted back into memory from the disk copy
    Resident,
    /// Served from memory
    Accessed,
    /// Evicted from memory
    NonResident,
    /// Removed from the cache
    Removed,
}

/// Snapshot of a tile's state delivered to observers.
///
/// Carries no live reference, so observers cannot mutate cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSnapshot {
    pub id: TileId,
    pub tile_x: i32,
    pub tile_y: i32,
    pub action: TileAction,
    /// Payload size in bytes
    pub size: u64,
    /// Whether the tile was resident when the event fired
    pub resident: bool,
}

impl TileSnapshot {
    pub(super) fn of(tile: &DiskBackedTile, resident: bool) -> Self {
        Self {
            id: tile.id(),
            tile_x: tile.tile_x(),
            tile_y: tile.tile_y(),
            action: tile.action(),
            size: tile.size(),
            resident,
        }
    }
}

/// Receives tile lifecycle notifications while diagnostics are enabled.
///
/// Notifications are emitted with the cache lock held; observers must not
/// call back into the cache from the same thread.
pub trait CacheObserver: Send + Sync {
    fn on_tile_event(&self, event: &TileSnapshot);
}

/// Visits every tile known to the cache. Runs under the cache lock.
pub trait TileVisitor {
    fn visit(&mut self, tile: &DiskBackedTile, resident: bool);
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of tiles the cache knows about
    pub num_tiles: usize,
    /// Number of tiles currently resident in memory
    pub num_resident_tiles: usize,
    /// Bytes held by resident payloads
    pub current_memory: u64,
    /// Memory capacity in bytes
    pub memory_capacity: u64,
    /// Lookups served (from memory or disk)
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Tiles evicted from memory
    pub evictions: u64,
    /// Evicted payloads written back to disk
    pub writebacks: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
