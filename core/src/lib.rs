//! Two-tier tile cache for very large tiled raster images.
//!
//! Tiles are indexed by (image identity, tile column, tile row). A bounded
//! subset stays resident in memory; the remainder spills to per-tile files in
//! a temporary directory, so working sets far larger than RAM remain
//! reachable.
//!
//! This crate provides:
//! - [`TileCache`], the concurrent cache façade with exact byte accounting
//! - [`TileComparator`] for pluggable eviction priorities (LRU by default)
//! - [`DiskBackedTile`], the per-tile record with an optional on-disk copy
//! - [`CacheObserver`] lifecycle notifications and a [`TileVisitor`] hook
//! - an idle-triggered auto-flush scheduler

pub mod cache;
pub mod config;
pub mod image;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    CacheError, CacheObserver, CacheStats, LruComparator, TileAction, TileCache, TileComparator,
    TileSnapshot, TileVisitor,
};
pub use config::CacheConfig;
pub use image::{ImageId, RenderedImage, SampleModel, SampleType};
pub use tile::{DiskBackedTile, TileData, TileId};
