//! The tile cache façade and its locked state
//!
//! One exclusive lock protects the tiles table, the resident table, the
//! sorted resident list, the memory accounting, the priority policy, and the
//! observer registry. Disk I/O runs inside the lock: admission and eviction
//! stay mutually exclusive and the accounting stays exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::CacheConfig;
use crate::image::RenderedImage;
use crate::tile::{DiskBackedTile, TileData, TileId};

use super::policy::{LruComparator, TileComparator};
use super::types::{CacheError, CacheObserver, CacheStats, TileAction, TileSnapshot, TileVisitor};

/// Fraction of capacity retained by `memory_control`
const DEFAULT_MEMORY_THRESHOLD: f64 = 0.75;

/// Everything the cache lock protects.
pub(super) struct CacheState {
    /// Every tile the cache knows about
    pub(super) tiles: HashMap<TileId, DiskBackedTile>,
    /// Resident payloads; every key is also in `tiles`
    pub(super) resident: HashMap<TileId, TileData>,
    /// Resident ids, sorted on demand by the comparator (victim last)
    pub(super) sorted: Vec<TileId>,
    /// Sum of payload sizes over `resident`
    pub(super) current_memory: u64,
    pub(super) memory_capacity: u64,
    pub(super) memory_threshold: f64,
    pub(super) comparator: Arc<dyn TileComparator>,
    pub(super) observers: Vec<Arc<dyn CacheObserver>>,
    pub(super) diagnostics: bool,
    pub(super) write_through: bool,
    pub(super) spill_dir: Arc<TempDir>,
    /// Monotone clock handed out as per-tile access ticks
    pub(super) access_clock: u64,
    pub(super) hits: u64,
    pub(super) misses: u64,
    pub(super) evictions: u64,
    pub(super) writebacks: u64,
}

impl CacheState {
    pub(super) fn next_tick(&mut self) -> u64 {
        self.access_clock += 1;
        self.access_clock
    }

    /// Admission procedure shared by `add` and promotion on `get_tile`.
    ///
    /// Returns `false` when the tile can only live on disk. Otherwise makes
    /// room (threshold trim first, hard `make_room` as the fallback), inserts
    /// the payload, and accounts its size.
    pub(super) fn admit(&mut self, id: TileId, data: TileData) -> bool {
        let size = data.size();
        if size > self.memory_capacity {
            return false;
        }
        if size > self.memory_capacity - self.current_memory {
            self.memory_control();
            if size > self.memory_capacity - self.current_memory && self.make_room(size).is_err() {
                return false;
            }
        }
        self.resident.insert(id, data);
        self.sorted.push(id);
        self.current_memory += size;
        true
    }

    /// Drop a tile entirely: residency, disk copy, and the record itself.
    pub(super) fn remove_tile(&mut self, id: TileId) {
        if let Some(data) = self.resident.remove(&id) {
            self.current_memory = self.current_memory.saturating_sub(data.size());
            self.sorted.retain(|t| *t != id);
        }
        if let Some(mut tile) = self.tiles.remove(&id) {
            tile.delete_disk_copy();
            tile.set_action(TileAction::Removed);
            self.notify_tile(&tile, false);
        }
    }

    /// Empty the resident table and list without touching disk copies.
    pub(super) fn flush_resident(&mut self) -> usize {
        let count = self.resident.len();
        self.resident.clear();
        self.sorted.clear();
        self.current_memory = 0;
        count
    }

    /// Drop everything the cache holds, including every disk copy.
    pub(super) fn flush_all(&mut self) {
        self.resident.clear();
        self.sorted.clear();
        self.current_memory = 0;
        let ids: Vec<TileId> = self.tiles.keys().copied().collect();
        for id in ids {
            if let Some(mut tile) = self.tiles.remove(&id) {
                tile.delete_disk_copy();
                tile.set_action(TileAction::Removed);
                self.notify_tile(&tile, false);
            }
        }
    }

    pub(super) fn notify(&self, id: TileId) {
        if !self.diagnostics {
            return;
        }
        if let Some(tile) = self.tiles.get(&id) {
            self.notify_tile(tile, self.resident.contains_key(&id));
        }
    }

    pub(super) fn notify_tile(&self, tile: &DiskBackedTile, resident: bool) {
        if !self.diagnostics {
            return;
        }
        let snapshot = TileSnapshot::of(tile, resident);
        for observer in &self.observers {
            observer.on_tile_event(&snapshot);
        }
    }

    pub(super) fn update_memory_gauges(&self) {
        gauge!("rastercache_resident_bytes").set(self.current_memory as f64);
        gauge!("rastercache_resident_tiles").set(self.resident.len() as f64);
    }
}

/// Shared between the cache handle and the auto-flush task.
pub(super) struct CacheShared {
    pub(super) state: Mutex<CacheState>,
    /// Anchor for the idle-window clock
    epoch: Instant,
    last_touch_ms: AtomicU64,
}

impl CacheShared {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Record activity; pushes the auto-flush deadline forward.
    pub(super) fn touch(&self) {
        self.last_touch_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    /// Time since the last cache touch.
    pub(super) fn idle(&self) -> Duration {
        let idle_ms = self
            .now_ms()
            .saturating_sub(self.last_touch_ms.load(Ordering::Relaxed));
        Duration::from_millis(idle_ms)
    }
}

/// Two-tier tile cache with explicit memory accounting.
///
/// Keeps a bounded set of tile payloads resident in memory and spills the
/// rest to per-tile files in a temporary directory the cache owns. Victim
/// selection goes through a pluggable [`TileComparator`]; writable victims
/// are written back to disk on eviction.
///
/// All operations are safe to call from multiple threads; mutating and
/// reading operations serialize on one internal lock.
pub struct TileCache {
    pub(super) shared: Arc<CacheShared>,
    pub(super) auto_flush_interval: Mutex<Duration>,
    pub(super) flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl TileCache {
    /// Create a cache with the default configuration.
    pub fn new() -> Result<Self, CacheError> {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache from `config`.
    ///
    /// Fails if the spill directory cannot be created. When
    /// `config.auto_flush` is set the scheduler starts immediately, which
    /// requires a running tokio runtime.
    pub fn with_config(config: CacheConfig) -> Result<Self, CacheError> {
        let spill_dir = Arc::new(TempDir::with_prefix("rastercache-")?);
        let state = CacheState {
            tiles: HashMap::new(),
            resident: HashMap::new(),
            sorted: Vec::new(),
            current_memory: 0,
            memory_capacity: config.memory_capacity,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            comparator: Arc::new(LruComparator),
            observers: Vec::new(),
            diagnostics: false,
            write_through: config.write_through,
            spill_dir,
            access_clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            writebacks: 0,
        };
        // A zero interval is invalid; fall back to the default
        let interval = if config.auto_flush_interval.is_zero() {
            crate::config::DEFAULT_AUTO_FLUSH_INTERVAL
        } else {
            config.auto_flush_interval
        };
        let cache = Self {
            shared: Arc::new(CacheShared {
                state: Mutex::new(state),
                epoch: Instant::now(),
                last_touch_ms: AtomicU64::new(0),
            }),
            auto_flush_interval: Mutex::new(interval),
            flush_task: Mutex::new(None),
        };
        if config.auto_flush {
            cache.enable_auto_flush();
        }
        Ok(cache)
    }

    /// Add a tile to the cache.
    ///
    /// A tile already present under the same id is left untouched. Payloads
    /// that can never fit in memory are written to disk instead of being
    /// admitted; in write-through mode resident payloads are written to disk
    /// as well. I/O failures are logged, not returned.
    pub fn add(
        &self,
        owner: &Arc<dyn RenderedImage>,
        tile_x: i32,
        tile_y: i32,
        data: TileData,
        metric: Option<f64>,
    ) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        let id = TileId::derive(owner.as_ref(), tile_x, tile_y);
        if state.tiles.contains_key(&id) {
            return;
        }

        let tick = state.next_tick();
        let tile = DiskBackedTile::new(
            id,
            Arc::downgrade(owner),
            tile_x,
            tile_y,
            &data,
            metric,
            state.spill_dir.clone(),
            tick,
        );
        state.tiles.insert(id, tile);

        let admitted = state.admit(id, data.clone());
        let write_through = state.write_through;
        if let Some(tile) = state.tiles.get_mut(&id) {
            tile.set_action(if admitted {
                TileAction::AddedResident
            } else {
                TileAction::Added
            });
            if !admitted || write_through {
                match tile.write_data(&data) {
                    Ok(()) => {
                        counter!("rastercache_spilled_bytes_total").increment(data.size());
                    }
                    Err(e) => {
                        warn!("Failed to write tile ({}, {}) to disk: {}", tile_x, tile_y, e);
                    }
                }
            }
        }
        state.notify(id);
        state.update_memory_gauges();
    }

    /// Add one tile per point.
    ///
    /// `points` and `payloads` must have equal length, as must `metrics`
    /// when supplied.
    pub fn add_tiles(
        &self,
        owner: &Arc<dyn RenderedImage>,
        points: &[(i32, i32)],
        payloads: &[TileData],
        metrics: Option<&[f64]>,
    ) -> Result<(), CacheError> {
        if points.len() != payloads.len() {
            return Err(CacheError::InvalidArgument(format!(
                "points ({}) and payloads ({}) differ in length",
                points.len(),
                payloads.len()
            )));
        }
        if let Some(metrics) = metrics
            && metrics.len() != points.len()
        {
            return Err(CacheError::InvalidArgument(format!(
                "points ({}) and metrics ({}) differ in length",
                points.len(),
                metrics.len()
            )));
        }
        for (i, &(x, y)) in points.iter().enumerate() {
            self.add(owner, x, y, payloads[i].clone(), metrics.map(|m| m[i]));
        }
        Ok(())
    }

    /// Remove a tile, deleting its disk copy. A no-op when the tile is
    /// unknown.
    pub fn remove(&self, owner: &Arc<dyn RenderedImage>, tile_x: i32, tile_y: i32) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        let id = TileId::derive(owner.as_ref(), tile_x, tile_y);
        state.remove_tile(id);
        state.update_memory_gauges();
    }

    /// Remove every tile of `owner`'s grid.
    pub fn remove_tiles(&self, owner: &Arc<dyn RenderedImage>) {
        for (x, y) in tile_grid(owner) {
            self.remove(owner, x, y);
        }
    }

    /// Drop every tile whose owning image has been dropped.
    pub fn remove_null_tiles(&self) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        let orphans: Vec<TileId> = state
            .tiles
            .iter()
            .filter(|(_, tile)| tile.owner().is_none())
            .map(|(id, _)| *id)
            .collect();
        for id in orphans {
            state.remove_tile(id);
        }
        state.update_memory_gauges();
    }

    /// Fetch a tile's payload.
    ///
    /// Resident tiles are served from memory. Non-resident tiles are re-read
    /// from their disk copy and promoted back into memory, which may evict
    /// other tiles; a tile that can never fit is served without promotion. A
    /// missing disk copy is a plain miss.
    pub fn get_tile(
        &self,
        owner: &Arc<dyn RenderedImage>,
        tile_x: i32,
        tile_y: i32,
    ) -> Option<TileData> {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        let id = TileId::derive(owner.as_ref(), tile_x, tile_y);
        if !state.tiles.contains_key(&id) {
            state.misses += 1;
            counter!("rastercache_misses_total").increment(1);
            return None;
        }

        if let Some(data) = state.resident.get(&id).cloned() {
            let tick = state.next_tick();
            if let Some(tile) = state.tiles.get_mut(&id) {
                tile.touch(tick);
                tile.set_action(TileAction::Accessed);
            }
            state.hits += 1;
            counter!("rastercache_hits_total").increment(1);
            state.notify(id);
            return Some(data);
        }

        // Non-resident: rehydrate from the spill file.
        let read = state.tiles.get(&id).and_then(|tile| {
            tile.read_data().unwrap_or_else(|e| {
                warn!("Failed to read spilled tile ({}, {}): {}", tile_x, tile_y, e);
                None
            })
        });
        let Some(data) = read else {
            state.misses += 1;
            counter!("rastercache_misses_total").increment(1);
            return None;
        };

        let promoted = state.admit(id, data.clone());
        if promoted {
            if let Some(tile) = state.tiles.get_mut(&id) {
                tile.set_action(TileAction::Resident);
            }
            state.notify(id);
        }
        let tick = state.next_tick();
        if let Some(tile) = state.tiles.get_mut(&id) {
            tile.touch(tick);
            tile.set_action(TileAction::Accessed);
        }
        state.hits += 1;
        counter!("rastercache_hits_total").increment(1);
        state.notify(id);
        state.update_memory_gauges();
        Some(data)
    }

    /// Fetch every tile the cache holds for `owner`, re-reading spilled
    /// copies as needed.
    pub fn get_tiles(&self, owner: &Arc<dyn RenderedImage>) -> Vec<TileData> {
        let mut tiles = Vec::new();
        for (x, y) in tile_grid(owner) {
            if let Some(data) = self.get_tile(owner, x, y) {
                tiles.push(data);
            }
        }
        tiles
    }

    /// Fetch the payloads at the given points; `None` per missing tile.
    pub fn get_tiles_at(
        &self,
        owner: &Arc<dyn RenderedImage>,
        points: &[(i32, i32)],
    ) -> Vec<Option<TileData>> {
        points
            .iter()
            .map(|&(x, y)| self.get_tile(owner, x, y))
            .collect()
    }

    /// Re-serialize a resident tile's payload to its existing disk copy.
    ///
    /// Tiles without a disk copy are left alone; their payload is written at
    /// eviction time. Fails with [`CacheError::TileNotResident`] when the
    /// tile is not in memory.
    pub fn set_tile_changed(
        &self,
        owner: &Arc<dyn RenderedImage>,
        tile_x: i32,
        tile_y: i32,
    ) -> Result<(), CacheError> {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        let id = TileId::derive(owner.as_ref(), tile_x, tile_y);
        let Some(data) = state.resident.get(&id).cloned() else {
            return Err(CacheError::TileNotResident { tile_x, tile_y });
        };
        if let Some(tile) = state.tiles.get_mut(&id)
            && tile.disk_file().is_some()
        {
            tile.write_data(&data)?;
            state.writebacks += 1;
            counter!("rastercache_writebacks_total").increment(1);
        }
        Ok(())
    }

    /// Drop everything: resident payloads, tile records, and disk copies.
    pub fn flush(&self) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.flush_all();
        state.update_memory_gauges();
    }

    /// Empty the resident table without touching disk copies.
    pub fn flush_memory(&self) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.flush_resident();
        state.update_memory_gauges();
    }

    /// Trim residency down to the threshold fraction of capacity.
    pub fn memory_control(&self) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.memory_control();
        state.update_memory_gauges();
    }

    /// Change the memory capacity.
    ///
    /// Shrinking below the current usage evicts (with write-back) until the
    /// new capacity is respected; a capacity of zero leaves nothing resident.
    pub fn set_memory_capacity(&self, capacity: u64) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.memory_capacity = capacity;
        state.shrink_to(capacity);
        state.update_memory_gauges();
    }

    /// Set the fraction of capacity retained by `memory_control`; clamped to
    /// [0, 1]. Triggers a trim.
    pub fn set_memory_threshold(&self, threshold: f64) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.memory_threshold = threshold.clamp(0.0, 1.0);
        state.memory_control();
        state.update_memory_gauges();
    }

    /// Replace the eviction policy; `None` restores the default LRU order.
    /// The resident list is rebuilt from the resident set.
    pub fn set_tile_comparator(&self, comparator: Option<Arc<dyn TileComparator>>) {
        self.shared.touch();
        let mut state = self.shared.state.lock().unwrap();
        state.comparator = comparator.unwrap_or_else(|| Arc::new(LruComparator));
        let rebuilt: Vec<TileId> = state.resident.keys().copied().collect();
        state.sorted = rebuilt;
    }

    /// Register an observer. Events fire only while diagnostics are enabled.
    pub fn add_observer(&self, observer: Arc<dyn CacheObserver>) {
        let mut state = self.shared.state.lock().unwrap();
        state.observers.push(observer);
    }

    /// Enable or disable lifecycle notifications.
    pub fn set_diagnostics(&self, enabled: bool) {
        let mut state = self.shared.state.lock().unwrap();
        state.diagnostics = enabled;
    }

    /// Visit every known tile under the cache lock.
    pub fn accept(&self, visitor: &mut dyn TileVisitor) {
        self.shared.touch();
        let state = self.shared.state.lock().unwrap();
        for (id, tile) in &state.tiles {
            visitor.visit(tile, state.resident.contains_key(id));
        }
    }

    pub fn contains_tile(&self, owner: &Arc<dyn RenderedImage>, tile_x: i32, tile_y: i32) -> bool {
        self.shared.touch();
        let state = self.shared.state.lock().unwrap();
        state
            .tiles
            .contains_key(&TileId::derive(owner.as_ref(), tile_x, tile_y))
    }

    pub fn contains_resident_tile(
        &self,
        owner: &Arc<dyn RenderedImage>,
        tile_x: i32,
        tile_y: i32,
    ) -> bool {
        self.shared.touch();
        let state = self.shared.state.lock().unwrap();
        state
            .resident
            .contains_key(&TileId::derive(owner.as_ref(), tile_x, tile_y))
    }

    /// Number of tiles the cache knows about
    pub fn num_tiles(&self) -> usize {
        self.shared.state.lock().unwrap().tiles.len()
    }

    /// Number of tiles currently resident in memory
    pub fn num_resident_tiles(&self) -> usize {
        self.shared.state.lock().unwrap().resident.len()
    }

    /// Memory capacity in bytes
    pub fn memory_capacity(&self) -> u64 {
        self.shared.state.lock().unwrap().memory_capacity
    }

    /// Bytes held by resident payloads
    pub fn current_memory(&self) -> u64 {
        self.shared.state.lock().unwrap().current_memory
    }

    /// Fraction of capacity retained by `memory_control`
    pub fn memory_threshold(&self) -> f64 {
        self.shared.state.lock().unwrap().memory_threshold
    }

    /// The active eviction policy
    pub fn tile_comparator(&self) -> Arc<dyn TileComparator> {
        self.shared.state.lock().unwrap().comparator.clone()
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock().unwrap();
        CacheStats {
            num_tiles: state.tiles.len(),
            num_resident_tiles: state.resident.len(),
            current_memory: state.current_memory,
            memory_capacity: state.memory_capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            writebacks: state.writebacks,
        }
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        if let Ok(mut task) = self.flush_task.lock()
            && let Some(task) = task.take()
        {
            task.abort();
        }
        // Best-effort flush; the spill directory itself is removed with the
        // last Arc<TempDir>.
        if let Ok(mut state) = self.shared.state.lock() {
            state.flush_all();
        }
    }
}

/// All (x, y) tile positions of `owner`'s grid.
fn tile_grid(owner: &Arc<dyn RenderedImage>) -> Vec<(i32, i32)> {
    let min_x = owner.min_tile_x();
    let min_y = owner.min_tile_y();
    let mut points = Vec::with_capacity((owner.num_x_tiles() * owner.num_y_tiles()).max(0) as usize);
    for y in min_y..min_y + owner.num_y_tiles() {
        for x in min_x..min_x + owner.num_x_tiles() {
            points.push((x, y));
        }
    }
    points
}
