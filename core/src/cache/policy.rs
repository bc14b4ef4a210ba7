//! Priority policies for eviction ordering

use std::cmp::Ordering;

use crate::tile::DiskBackedTile;

/// Total order over resident tiles.
///
/// After sorting the resident list with a comparator, the **last** element is
/// the next eviction victim. The cache sorts with a stable sort, so ties keep
/// a consistent order within a single pass. Comparators can use any of the
/// tile's metadata, including the user-supplied [`metric`](DiskBackedTile::metric).
pub trait TileComparator: Send + Sync {
    fn compare(&self, a: &DiskBackedTile, b: &DiskBackedTile) -> Ordering;
}

/// Default policy: least recently accessed tiles are evicted first.
///
/// Most recently accessed tiles sort first, leaving the oldest access last —
/// where the eviction loop picks its victims.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruComparator;

impl TileComparator for LruComparator {
    fn compare(&self, a: &DiskBackedTile, b: &DiskBackedTile) -> Ordering {
        b.last_access().cmp(&a.last_access())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageId, RenderedImage, SampleModel, SampleType};
    use crate::tile::{TileData, TileId};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TestImage;

    impl RenderedImage for TestImage {
        fn id(&self) -> ImageId {
            ImageId::Wide(9)
        }
        fn sample_model(&self) -> SampleModel {
            SampleModel {
                data_type: SampleType::U8,
                num_bands: 1,
            }
        }
        fn min_tile_x(&self) -> i32 {
            0
        }
        fn min_tile_y(&self) -> i32 {
            0
        }
        fn num_x_tiles(&self) -> i32 {
            2
        }
        fn num_y_tiles(&self) -> i32 {
            1
        }
    }

    fn tile_with_tick(image: &Arc<dyn RenderedImage>, dir: &Arc<TempDir>, x: i32, tick: u64) -> DiskBackedTile {
        let data = TileData::new(vec![0u8; 8], true);
        DiskBackedTile::new(
            TileId::derive(image.as_ref(), x, 0),
            Arc::downgrade(image),
            x,
            0,
            &data,
            None,
            dir.clone(),
            tick,
        )
    }

    #[test]
    fn test_lru_puts_oldest_access_last() {
        let image: Arc<dyn RenderedImage> = Arc::new(TestImage);
        let dir = Arc::new(TempDir::new().expect("temp dir"));
        let old = tile_with_tick(&image, &dir, 0, 1);
        let recent = tile_with_tick(&image, &dir, 1, 5);

        let cmp = LruComparator;
        assert_eq!(cmp.compare(&recent, &old), Ordering::Less);
        assert_eq!(cmp.compare(&old, &recent), Ordering::Greater);
        assert_eq!(cmp.compare(&old, &old), Ordering::Equal);
    }
}
