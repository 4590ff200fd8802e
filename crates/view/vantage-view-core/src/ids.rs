//! Identifiers and allocators for core entities.
//!
//! Dense indices improve cache locality; IDs are opaque externally. Tile
//! indices are globally unique and monotonically assigned across all images
//! and layers at construction time; they are the sole tile identity crossing
//! the host boundary.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CanvasId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndex(pub u32);

/// Monotonic allocator for canvas/image ids and contiguous tile ranges.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_canvas: u32,
    next_image: u32,
    next_tile: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_canvas(&mut self) -> CanvasId {
        let id = CanvasId(self.next_canvas);
        self.next_canvas = self.next_canvas.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_image(&mut self) -> ImageId {
        let id = ImageId(self.next_image);
        self.next_image = self.next_image.wrapping_add(1);
        id
    }

    /// Reserve `count` consecutive tile indices, returning the first.
    #[inline]
    pub fn alloc_tiles(&mut self, count: u32) -> TileIndex {
        let id = TileIndex(self.next_tile);
        self.next_tile = self.next_tile.wrapping_add(count);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
