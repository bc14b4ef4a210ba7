//! Per-tile record with an optional on-disk payload copy
//!
//! Each tile owns its spill file exclusively: only the tile writes or deletes
//! it. Writes go to a temporary file first and are renamed into place, so the
//! previous copy stays intact if a write fails partway.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tempfile::{NamedTempFile, TempDir};
use tracing::warn;

use crate::cache::{CacheError, TileAction};
use crate::image::RenderedImage;

use super::{TileData, TileId};

/// Per-tile cache record: metadata, lifecycle state, and payload I/O.
///
/// The cache owns every `DiskBackedTile`; the owning image is held weakly and
/// may be dropped without breaking the cache.
#[derive(Debug)]
pub struct DiskBackedTile {
    id: TileId,
    owner: Weak<dyn RenderedImage>,
    tile_x: i32,
    tile_y: i32,
    /// Payload size in bytes, fixed at construction
    size: u64,
    writable: bool,
    /// Present iff a persisted copy exists on disk
    disk_file: Option<PathBuf>,
    /// Monotone access tick assigned by the cache
    last_access: u64,
    action: TileAction,
    /// User-supplied tag for custom priority policies
    metric: Option<f64>,
    spill_dir: Arc<TempDir>,
}

impl DiskBackedTile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TileId,
        owner: Weak<dyn RenderedImage>,
        tile_x: i32,
        tile_y: i32,
        data: &TileData,
        metric: Option<f64>,
        spill_dir: Arc<TempDir>,
        tick: u64,
    ) -> Self {
        Self {
            id,
            owner,
            tile_x,
            tile_y,
            size: data.size(),
            writable: data.is_writable(),
            disk_file: None,
            last_access: tick,
            action: TileAction::Added,
            metric,
            spill_dir,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// The owning image, if it is still alive
    pub fn owner(&self) -> Option<Arc<dyn RenderedImage>> {
        self.owner.upgrade()
    }

    pub fn tile_x(&self) -> i32 {
        self.tile_x
    }

    pub fn tile_y(&self) -> i32 {
        self.tile_y
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the payload can be written back at eviction time
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Path of the persisted copy, if one exists
    pub fn disk_file(&self) -> Option<&Path> {
        self.disk_file.as_deref()
    }

    /// Monotone tick of the most recent access
    pub fn last_access(&self) -> u64 {
        self.last_access
    }

    /// Current lifecycle label
    pub fn action(&self) -> TileAction {
        self.action
    }

    /// User-supplied priority tag
    pub fn metric(&self) -> Option<f64> {
        self.metric
    }

    pub(crate) fn set_action(&mut self, action: TileAction) {
        self.action = action;
    }

    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_access = tick;
    }

    /// Serialize the payload to this tile's spill file.
    ///
    /// Writes to a temporary file in the spill directory and renames it into
    /// place, so an existing copy survives a failed write.
    pub(crate) fn write_data(&mut self, data: &TileData) -> Result<(), CacheError> {
        let mut tmp = NamedTempFile::new_in(self.spill_dir.path())?;
        tmp.write_all(data.bytes())?;
        tmp.as_file().sync_all()?;

        let path = self.spill_path();
        tmp.persist(&path)
            .map_err(|e| CacheError::DiskCacheFailed(e.error))?;
        self.disk_file = Some(path);
        Ok(())
    }

    /// Read the payload back from the spill file.
    ///
    /// Returns `None` when no persisted copy exists; the caller treats that
    /// as a cache miss.
    pub(crate) fn read_data(&self) -> Result<Option<TileData>, CacheError> {
        let Some(path) = &self.disk_file else {
            return Ok(None);
        };
        let raw = fs::read(path)?;
        Ok(Some(TileData::new(raw, self.writable)))
    }

    /// Best-effort removal of the persisted copy. An already-missing file is
    /// not an error.
    pub(crate) fn delete_disk_copy(&mut self) {
        if let Some(path) = self.disk_file.take()
            && let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to delete spilled tile {:?}: {}", path, e);
        }
    }

    fn spill_path(&self) -> PathBuf {
        self.spill_dir.path().join(format!("{}.tile", self.id))
    }
}
