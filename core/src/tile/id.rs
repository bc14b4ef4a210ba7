//! Stable tile identifiers

use crate::image::{ImageId, RenderedImage};

/// Uniquely identifies a tile within the cache.
///
/// Derived from the owning image's identity plus the tile's position in the
/// grid. The id is stable while the image is alive and does not collide
/// across distinct (image, x, y) triples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(u128);

impl TileId {
    /// Derive the id of `image`'s tile at (`tile_x`, `tile_y`).
    pub fn derive(image: &dyn RenderedImage, tile_x: i32, tile_y: i32) -> Self {
        Self::from_parts(image.id(), image.num_x_tiles(), tile_x, tile_y)
    }

    /// Pure derivation from an image identity and the grid width.
    ///
    /// Wide identities concatenate the identity's big-endian bytes with the
    /// 8-byte tile index. Narrow identities pack the 32-bit identity into the
    /// upper half and the 32-bit tile index into the lower half of a `u64`.
    pub fn from_parts(id: ImageId, num_x_tiles: i32, tile_x: i32, tile_y: i32) -> Self {
        let index = tile_y as i64 * num_x_tiles as i64 + tile_x as i64;
        match id {
            ImageId::Wide(wide) => {
                let mut raw = [0u8; 16];
                raw[..8].copy_from_slice(&wide.to_be_bytes());
                raw[8..].copy_from_slice(&(index as u64).to_be_bytes());
                TileId(u128::from_be_bytes(raw))
            }
            ImageId::Narrow(narrow) => {
                TileId(u128::from((u64::from(narrow) << 32) | u64::from(index as u32)))
            }
        }
    }

    /// Raw id value
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = TileId::from_parts(ImageId::Wide(42), 16, 3, 7);
        let b = TileId::from_parts(ImageId::Wide(42), 16, 3, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_wide_layout_concatenates_identity_and_index() {
        // index = 2 * 16 + 5 = 37
        let id = TileId::from_parts(ImageId::Wide(7), 16, 5, 2);
        assert_eq!(id.as_u128(), (7u128 << 64) | 37);
    }

    #[test]
    fn test_narrow_packs_identity_high_and_index_low() {
        // index = 2 * 16 + 3 = 35
        let id = TileId::from_parts(ImageId::Narrow(0xABCD_0001), 16, 3, 2);
        assert_eq!(id.as_u128(), u128::from((0xABCD_0001u64 << 32) | 35));
    }

    #[test]
    fn test_wide_identities_sharing_low_bits_stay_distinct() {
        let low_bits = 0x0000_0000_1234_5678u64;
        let a = TileId::from_parts(ImageId::Wide(low_bits), 16, 0, 0);
        let b = TileId::from_parts(ImageId::Wide((1 << 32) | low_bits), 16, 0, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_grid_positions_are_unique() {
        let mut seen = HashSet::new();
        for y in 0..8 {
            for x in 0..8 {
                assert!(seen.insert(TileId::from_parts(ImageId::Wide(1), 8, x, y)));
            }
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn test_negative_coordinates_are_distinct() {
        let a = TileId::from_parts(ImageId::Wide(1), 8, -1, 0);
        let b = TileId::from_parts(ImageId::Wide(1), 8, 0, -1);
        let c = TileId::from_parts(ImageId::Wide(1), 8, 0, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }
}
