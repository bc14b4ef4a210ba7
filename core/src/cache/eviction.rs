//! Capacity enforcement: victim selection and write-back on spill
//!
//! Two entry points share the same loop. `memory_control` is the threshold
//! trim run after threshold changes and periodically; `make_room` is the
//! admission-time variant that must free a specific amount regardless of the
//! threshold.

use metrics::counter;
use tracing::{debug, warn};

use crate::tile::TileId;

use super::tile_cache::CacheState;
use super::types::{CacheError, TileAction};

impl CacheState {
    /// Trim residency down to `memory_threshold * memory_capacity`.
    pub(super) fn memory_control(&mut self) {
        let target = (self.memory_threshold * self.memory_capacity as f64) as u64;
        self.shrink_to(target);
    }

    /// Evict until at least `required` bytes of capacity are free.
    ///
    /// Fails when `required` exceeds the capacity outright. Unreachable
    /// through the public API (admission checks the payload size first); the
    /// guard catches internal misuse.
    pub(super) fn make_room(&mut self, required: u64) -> Result<(), CacheError> {
        if required > self.memory_capacity {
            return Err(CacheError::CapacityTooSmall {
                required,
                capacity: self.memory_capacity,
            });
        }
        self.sort_resident();
        while self.memory_capacity - self.current_memory < required {
            let Some(&victim) = self.sorted.last() else {
                break;
            };
            self.evict_one(victim);
        }
        Ok(())
    }

    /// Evict victims until `current_memory <= target`.
    pub(super) fn shrink_to(&mut self, target: u64) {
        if self.current_memory <= target {
            return;
        }
        self.sort_resident();
        while self.current_memory > target {
            let Some(&victim) = self.sorted.last() else {
                break;
            };
            self.evict_one(victim);
        }
    }

    /// Sort the resident list by the active policy, next victim last.
    pub(super) fn sort_resident(&mut self) {
        let tiles = &self.tiles;
        let comparator = &self.comparator;
        self.sorted.sort_by(|a, b| match (tiles.get(a), tiles.get(b)) {
            (Some(a), Some(b)) => comparator.compare(a, b),
            _ => std::cmp::Ordering::Equal,
        });
    }

    /// Drop one tile from residency.
    ///
    /// Writable payloads are written back to disk. A failed write-back is
    /// logged and the eviction completes anyway; the loop moves on to the
    /// next victim.
    pub(super) fn evict_one(&mut self, id: TileId) {
        let Some(data) = self.resident.remove(&id) else {
            return;
        };
        self.sorted.retain(|t| *t != id);
        self.current_memory = self.current_memory.saturating_sub(data.size());
        self.evictions += 1;
        counter!("rastercache_evictions_total").increment(1);

        if let Some(tile) = self.tiles.get_mut(&id) {
            if data.is_writable() {
                match tile.write_data(&data) {
                    Ok(()) => {
                        self.writebacks += 1;
                        counter!("rastercache_writebacks_total").increment(1);
                    }
                    Err(e) => {
                        warn!(
                            "Write-back of tile ({}, {}) failed: {}",
                            tile.tile_x(),
                            tile.tile_y(),
                            e
                        );
                    }
                }
            }
            tile.set_action(TileAction::NonResident);
            debug!(
                "Evicted tile ({}, {}), {} bytes",
                tile.tile_x(),
                tile.tile_y(),
                data.size()
            );
        }
        self.notify(id);
    }
}
