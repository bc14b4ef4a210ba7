//! Shared fixtures for integration tests

use std::sync::Arc;

use rand::RngCore;

use rastercache_core::{ImageId, RenderedImage, SampleModel, SampleType, TileData};

/// Minimal in-memory image supplying identity and grid geometry
pub struct TestImage {
    id: ImageId,
    num_x: i32,
    num_y: i32,
}

impl TestImage {
    pub fn new(id: u64, num_x: i32, num_y: i32) -> Arc<dyn RenderedImage> {
        Arc::new(Self {
            id: ImageId::Wide(id),
            num_x,
            num_y,
        })
    }
}

impl RenderedImage for TestImage {
    fn id(&self) -> ImageId {
        self.id
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
        self.num_x
    }

    fn num_y_tiles(&self) -> i32 {
        self.num_y
    }
}

/// Writable payload of `len` bytes filled with `byte`
pub fn payload(byte: u8, len: usize) -> TileData {
    TileData::new(vec![byte; len], true)
}

/// Writable payload with random contents
pub fn random_payload(len: usize) -> TileData {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    TileData::new(bytes, true)
}
