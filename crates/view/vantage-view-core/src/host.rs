//! Host callback surface.
//!
//! The engine never draws, fetches or stores anything itself. It calls back
//! into the host through this trait, injected at engine construction. Tile
//! identity crossing this boundary is always the global `TileIndex`; matrices
//! and rectangles cross as flat numeric arrays.

use crate::ids::{CanvasId, ImageId, TileIndex};

pub trait HostHooks {
    /// Draw one tile. Returns whether the tile's texture is already present
    /// and usable (false keeps the frame loop hot until it arrives).
    #[allow(clippy::too_many_arguments)]
    fn draw_tile(
        &mut self,
        image: ImageId,
        tile: TileIndex,
        layer: u32,
        col: u32,
        row: u32,
        opacity: f64,
        animating: bool,
        target_layer: bool,
    ) -> bool;

    /// Solid background quad behind paged galleries.
    fn draw_quad(&mut self, _opacity: f64) {}

    /// Host-owned per-tile load/fade state, 0..1.
    fn tile_opacity(&mut self, tile: TileIndex) -> f64;

    /// Advance the host-owned fade for a tile and return the new opacity.
    fn set_tile_opacity(&mut self, tile: TileIndex, force_full: bool, image_opacity: f64) -> f64;

    /// Per-canvas draw-time GPU state.
    fn set_matrix(&mut self, _matrix: &[f64; 16]) {}
    fn set_viewport(&mut self, _x: f64, _y: f64, _w: f64, _h: f64) {}

    /// State-change notifications for the host's reactive layer.
    fn view_set(&mut self, _canvas: CanvasId) {}
    fn viewport_set(&mut self, _canvas: CanvasId, _x: f64, _y: f64, _w: f64, _h: f64) {}
    fn set_visible(&mut self, _canvas: CanvasId, _visible: bool) {}
    fn set_image_visible(&mut self, _image: ImageId, _visible: bool) {}

    /// Exactly one of these fires per started animation, never both.
    fn ani_done(&mut self, _canvas: CanvasId) {}
    fn ani_abort(&mut self, _canvas: CanvasId) {}
}

/// Host that reports every tile as loaded and draws nothing. Used by tests
/// and as a stand-in before the real host attaches.
#[derive(Debug, Default)]
pub struct NoopHost;

impl HostHooks for NoopHost {
    fn draw_tile(
        &mut self,
        _image: ImageId,
        _tile: TileIndex,
        _layer: u32,
        _col: u32,
        _row: u32,
        _opacity: f64,
        _animating: bool,
        _target_layer: bool,
    ) -> bool {
        true
    }

    fn tile_opacity(&mut self, _tile: TileIndex) -> f64 {
        1.0
    }

    fn set_tile_opacity(&mut self, _tile: TileIndex, _force_full: bool, image_opacity: f64) -> f64 {
        image_opacity
    }
}
