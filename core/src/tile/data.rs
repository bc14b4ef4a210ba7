//! Opaque tile payloads

use bytes::Bytes;

/// A tile payload: an opaque byte container with a declared size and a
/// writable flag.
///
/// Writable payloads can be re-serialized, so the cache writes them back to
/// disk when they are evicted; non-writable payloads are dropped on eviction
/// and survive only if they were written through at admission time. Cloning
/// is cheap (the bytes are reference-counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    bytes: Bytes,
    writable: bool,
}

impl TileData {
    /// Wrap raw payload bytes
    pub fn new(bytes: impl Into<Bytes>, writable: bool) -> Self {
        Self {
            bytes: bytes.into(),
            writable,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Raw payload bytes
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Whether the payload can be re-serialized
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_matches_bytes() {
        let data = TileData::new(vec![0u8; 100], true);
        assert_eq!(data.size(), 100);
        assert!(data.is_writable());
    }

    #[test]
    fn test_clone_compares_equal() {
        let data = TileData::new(vec![1, 2, 3], false);
        let copy = data.clone();
        assert_eq!(data, copy);
        assert!(!copy.is_writable());
    }
}
