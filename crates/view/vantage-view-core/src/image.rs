//! Per-source tile pyramid and the tile-selection algorithm.
//!
//! Layers run coarsest-to-finest; every layer owns a contiguous range of the
//! global tile-index space, assigned once at construction. That number is the
//! only tile identity the host ever sees.

use hashbrown::HashSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::host::HostHooks;
use crate::ids::{IdAllocator, ImageId, TileIndex};
use crate::spherical::SphereWindow;
use crate::view::DrawRect;

/// 3D placement for images embedded in a spherical canvas.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EmbedPlacement {
    /// Euler rotation applied in the embed's own frame, radians.
    pub rotation: [f64; 3],
    pub scale: f64,
}

/// Static geometry for one tile source, supplied by the host at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInfo {
    pub width: f64,
    pub height: f64,
    pub tile_size: u32,
    /// Occupied area within the canvas, `[x0, y0, x1, y1]` normalized.
    pub area: [f64; 4],
    /// Coarsest layers to drop (archive-backed or partially visible sources).
    pub skip_layers: u32,
    /// Placement when embedded in a spherical canvas.
    pub placement: Option<EmbedPlacement>,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            tile_size: 1024,
            area: [0.0, 0.0, 1.0, 1.0],
            skip_layers: 0,
            placement: None,
        }
    }
}

/// One resolution level: tile geometry plus its global tile-index range.
#[derive(Clone, Copy, Debug)]
pub struct Layer {
    /// Source pixels per layer pixel (1 on the finest layer).
    pub downsample: f64,
    /// Layer dimensions in layer pixels.
    pub width: f64,
    pub height: f64,
    pub cols: u32,
    pub rows: u32,
    /// First global tile index of this layer's contiguous range.
    pub base: TileIndex,
}

impl Layer {
    #[inline]
    pub fn tile(&self, col: u32, row: u32) -> TileIndex {
        let col = col.min(self.cols.saturating_sub(1));
        let row = row.min(self.rows.saturating_sub(1));
        TileIndex(self.base.0 + row * self.cols + col)
    }

    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.cols * self.rows
    }
}

/// Per-frame tile selection counters feeding the global load-progress ratio.
#[derive(Clone, Copy, Debug, Default)]
pub struct TileStats {
    pub requested: u32,
    pub loaded: u32,
}

/// What part of the source is visible this frame, in image-local normalized
/// coordinates.
pub enum TileContext {
    Flat {
        /// Intersection of the image's area with the canvas view, or `None`
        /// when nothing is visible.
        visible: Option<[f64; 4]>,
        scale: f64,
    },
    /// Main spherical image: angular window instead of a rectangle, because
    /// a flat rectangular test is invalid near the poles and across the seam.
    Sphere { window: SphereWindow, scale: f64 },
}

#[derive(Clone, Debug)]
pub struct Image {
    pub id: ImageId,
    pub info: ImageInfo,
    pub layers: Vec<Layer>,
    pub opacity: f64,
    pub target_opacity: f64,
    /// Set the first time the base tile is confirmed drawn; triggers the
    /// canvas fade-in.
    pub base_loaded_at: Option<f64>,
    got_base: bool,
}

impl Image {
    pub fn new(id: ImageId, info: ImageInfo, ids: &mut IdAllocator) -> Result<Self, EngineError> {
        if info.width <= 0.0 || info.height <= 0.0 {
            return Err(EngineError::InvalidImageSize {
                width: info.width,
                height: info.height,
            });
        }
        if info.tile_size == 0 {
            return Err(EngineError::InvalidTileSize(info.tile_size));
        }

        // Layers double in tile pixel coverage until one tile contains the
        // whole image.
        let tile = info.tile_size as f64;
        let max_dim = info.width.max(info.height);
        let mut levels = 1u32;
        while tile * 2f64.powi(levels as i32 - 1) < max_dim {
            levels += 1;
        }
        let skip = info.skip_layers.min(levels - 1);

        let mut layers = Vec::with_capacity((levels - skip) as usize);
        for level in skip..levels {
            let downsample = 2f64.powi((levels - 1 - level) as i32);
            let width = (info.width / downsample).ceil();
            let height = (info.height / downsample).ceil();
            let cols = (width / tile).ceil().max(1.0) as u32;
            let rows = (height / tile).ceil().max(1.0) as u32;
            let base = ids.alloc_tiles(cols * rows);
            layers.push(Layer {
                downsample,
                width,
                height,
                cols,
                rows,
                base,
            });
        }
        debug!(
            "image {:?}: {}x{} tile={} layers={} (skipped {})",
            id, info.width, info.height, info.tile_size, layers.len(), skip
        );

        Ok(Self {
            id,
            info,
            layers,
            opacity: 0.0,
            target_opacity: 1.0,
            base_loaded_at: None,
            got_base: false,
        })
    }

    /// The coarsest layer that is not visibly blurry at `scale`: walking up
    /// from the skip floor, the first whose layer pixels are not stretched
    /// past one device pixel (times the under-zoom tolerance).
    pub fn target_layer(&self, scale: f64, under_zoom: f64) -> usize {
        let tolerance = under_zoom.max(1e-6);
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.downsample * scale <= tolerance {
                return i;
            }
        }
        self.layers.len() - 1
    }

    /// First tile of the coarsest kept layer: the always-requested
    /// placeholder.
    pub fn base_tile(&self) -> TileIndex {
        self.layers[0].base
    }

    /// Mark the base tile as confirmed drawn (called from the canvas draw
    /// pass). Returns `true` the first time, so the caller can start the
    /// fade-in exactly once.
    pub fn mark_base_drawn(&mut self, now: f64) -> bool {
        if self.base_loaded_at.is_none() {
            self.base_loaded_at = Some(now);
            return true;
        }
        false
    }

    /// Decode a global tile index owned by this image.
    pub fn locate(&self, tile: TileIndex) -> Option<(u32, u32, u32)> {
        for (i, layer) in self.layers.iter().enumerate() {
            let offset = tile.0.wrapping_sub(layer.base.0);
            if offset < layer.tile_count() {
                return Some((i as u32, offset % layer.cols, offset / layer.cols));
            }
        }
        None
    }

    /// Central per-frame selection: enqueue every tile needed to cover the
    /// visible part of this image at the target layer, falling back to
    /// coarser layers wherever the wanted tile has not loaded yet.
    pub fn get_tiles(
        &mut self,
        ctx: &TileContext,
        host: &mut dyn HostHooks,
        seen: &mut HashSet<TileIndex>,
        out: &mut Vec<DrawRect>,
    ) -> TileStats {
        let mut stats = TileStats::default();

        // 1) The base placeholder is requested until it has ever loaded.
        if !self.got_base {
            let base = self.base_tile();
            if host.tile_opacity(base) >= 1.0 {
                self.got_base = true;
            }
            self.push_tile(0, 0, 0, false, host, seen, out, &mut stats);
        }

        match ctx {
            TileContext::Flat { visible, scale } => {
                let Some(rect) = visible else {
                    return stats;
                };
                let target = self.target_layer(*scale, 1.0);
                self.push_range(target, rect[0], rect[1], rect[2], rect[3], host, seen, out, &mut stats);
            }
            TileContext::Sphere { window, scale } => {
                let target = self.target_layer(*scale, 1.0);
                let (y0, y1) = (window.y0, window.y1);
                if window.full_circle || window.x0 > window.x1 {
                    if window.full_circle {
                        self.push_range(target, 0.0, y0, 1.0, y1, host, seen, out, &mut stats);
                    } else {
                        // Seam crossing: two arcs.
                        self.push_range(target, window.x0, y0, 1.0, y1, host, seen, out, &mut stats);
                        self.push_range(target, 0.0, y0, window.x1, y1, host, seen, out, &mut stats);
                    }
                } else {
                    self.push_range(target, window.x0, y0, window.x1, y1, host, seen, out, &mut stats);
                }
            }
        }

        stats
    }

    /// Enqueue the tile range covering a rectangle (image-local normalized)
    /// at `layer_idx`.
    #[allow(clippy::too_many_arguments)]
    fn push_range(
        &self,
        layer_idx: usize,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        host: &mut dyn HostHooks,
        seen: &mut HashSet<TileIndex>,
        out: &mut Vec<DrawRect>,
        stats: &mut TileStats,
    ) {
        let layer = &self.layers[layer_idx];
        let tile = self.info.tile_size as f64;
        let c0 = ((x0.clamp(0.0, 1.0) * layer.width / tile).floor() as u32).min(layer.cols - 1);
        let c1 = ((x1.clamp(0.0, 1.0) * layer.width / tile).ceil() as u32)
            .clamp(c0 + 1, layer.cols);
        let r0 = ((y0.clamp(0.0, 1.0) * layer.height / tile).floor() as u32).min(layer.rows - 1);
        let r1 = ((y1.clamp(0.0, 1.0) * layer.height / tile).ceil() as u32)
            .clamp(r0 + 1, layer.rows);

        for row in r0..r1 {
            for col in c0..c1 {
                self.push_tile(layer_idx, col, row, true, host, seen, out, stats);
            }
        }
    }

    /// Enqueue one tile; when it has not fully loaded, recursively enqueue
    /// the coarser tile covering the same spot so something is always
    /// drawable (the progressive-refinement guarantee).
    #[allow(clippy::too_many_arguments)]
    fn push_tile(
        &self,
        layer_idx: usize,
        col: u32,
        row: u32,
        target: bool,
        host: &mut dyn HostHooks,
        seen: &mut HashSet<TileIndex>,
        out: &mut Vec<DrawRect>,
        stats: &mut TileStats,
    ) {
        let layer = &self.layers[layer_idx];
        let tile = layer.tile(col, row);
        if !seen.insert(tile) {
            return;
        }

        let opacity = host.tile_opacity(tile);
        if target {
            stats.requested += 1;
            if opacity >= 1.0 {
                stats.loaded += 1;
            }
        }
        out.push(DrawRect {
            layer: layer_idx as u32,
            tile,
            image: self.id,
            col,
            row,
            target_layer: target,
        });

        if opacity < 1.0 && layer_idx > 0 {
            // One layer coarser, same spot: halve the column/row at each
            // doubling of the downsample factor.
            let parent = &self.layers[layer_idx - 1];
            let ratio = layer.downsample / parent.downsample;
            let pcol = ((col as f64 + 0.5) * ratio) as u32;
            let prow = ((row as f64 + 0.5) * ratio) as u32;
            self.push_tile(layer_idx - 1, pcol.min(parent.cols - 1), prow.min(parent.rows - 1), false, host, seen, out, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoopHost;

    fn mk_image(w: f64, h: f64, tile: u32) -> (Image, IdAllocator) {
        let mut ids = IdAllocator::new();
        let id = ids.alloc_image();
        let img = Image::new(
            id,
            ImageInfo {
                width: w,
                height: h,
                tile_size: tile,
                ..Default::default()
            },
            &mut ids,
        )
        .unwrap();
        (img, ids)
    }

    #[test]
    fn layer_count_doubles_until_covered() {
        let (img, _) = mk_image(4000.0, 2000.0, 1024);
        // 1024, 2048, 4096 -> 3 levels.
        assert_eq!(img.layers.len(), 3);
        assert_eq!(img.layers[0].cols, 1);
        assert_eq!(img.layers[0].rows, 1);
        let finest = img.layers.last().unwrap();
        assert_eq!(finest.downsample, 1.0);
        assert_eq!(finest.cols, 4);
        assert_eq!(finest.rows, 2);
    }

    #[test]
    fn tile_indices_are_global_and_contiguous() {
        let mut ids = IdAllocator::new();
        let a = Image::new(
            ids.alloc_image(),
            ImageInfo {
                width: 2048.0,
                height: 2048.0,
                tile_size: 1024,
                ..Default::default()
            },
            &mut ids,
        )
        .unwrap();
        let b = Image::new(
            ids.alloc_image(),
            ImageInfo {
                width: 1024.0,
                height: 1024.0,
                tile_size: 1024,
                ..Default::default()
            },
            &mut ids,
        )
        .unwrap();
        // a: layer0 1 tile, layer1 4 tiles -> indices 0..5; b starts at 5.
        assert_eq!(a.layers[0].base, TileIndex(0));
        assert_eq!(a.layers[1].base, TileIndex(1));
        assert_eq!(b.layers[0].base, TileIndex(5));
        assert_eq!(a.locate(TileIndex(3)), Some((1, 0, 1)));
        assert_eq!(b.locate(TileIndex(3)), None);
    }

    #[test]
    fn target_layer_picks_coarsest_sharp_level() {
        let (img, _) = mk_image(4000.0, 2000.0, 1024);
        // Far out: coarsest layer suffices.
        assert_eq!(img.target_layer(0.1, 1.0), 0);
        // Native: finest layer.
        assert_eq!(img.target_layer(1.0, 1.0), 2);
        // Beyond native: clamped to finest.
        assert_eq!(img.target_layer(4.0, 1.0), 2);
    }

    #[test]
    fn skip_layers_drop_coarsest() {
        let mut ids = IdAllocator::new();
        let img = Image::new(
            ids.alloc_image(),
            ImageInfo {
                width: 4000.0,
                height: 2000.0,
                tile_size: 1024,
                skip_layers: 1,
                ..Default::default()
            },
            &mut ids,
        )
        .unwrap();
        assert_eq!(img.layers.len(), 2);
        assert!(img.layers[0].downsample < 4.0);
    }

    #[test]
    fn tiles_cover_visible_rect_and_include_base() {
        let (mut img, _) = mk_image(4000.0, 2000.0, 1024);
        let mut host = NoopHost;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let ctx = TileContext::Flat {
            visible: Some([0.0, 0.0, 1.0, 1.0]),
            scale: 1.0,
        };
        let stats = img.get_tiles(&ctx, &mut host, &mut seen, &mut out);
        // Full image at native scale: all 8 finest tiles, plus the base.
        assert_eq!(stats.requested, 8);
        assert_eq!(stats.loaded, 8);
        assert!(out.iter().any(|d| d.tile == img.base_tile()));
        assert!(out.iter().filter(|d| d.target_layer).count() == 8);
    }

    #[test]
    fn empty_intersection_still_requests_base() {
        let (mut img, _) = mk_image(4000.0, 2000.0, 1024);
        let mut host = NoopHost;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let ctx = TileContext::Flat {
            visible: None,
            scale: 1.0,
        };
        img.get_tiles(&ctx, &mut host, &mut seen, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tile, img.base_tile());
    }

    /// Host that reports nothing loaded, to exercise the coarser fallback.
    struct ColdHost;
    impl HostHooks for ColdHost {
        fn draw_tile(
            &mut self,
            _: ImageId,
            _: TileIndex,
            _: u32,
            _: u32,
            _: u32,
            _: f64,
            _: bool,
            _: bool,
        ) -> bool {
            false
        }
        fn tile_opacity(&mut self, _: TileIndex) -> f64 {
            0.0
        }
        fn set_tile_opacity(&mut self, _: TileIndex, _: bool, _: f64) -> f64 {
            0.0
        }
    }

    #[test]
    fn unloaded_tiles_fall_back_to_coarser_layers() {
        let (mut img, _) = mk_image(4000.0, 2000.0, 1024);
        let mut host = ColdHost;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let ctx = TileContext::Flat {
            visible: Some([0.4, 0.4, 0.6, 0.6]),
            scale: 1.0,
        };
        let stats = img.get_tiles(&ctx, &mut host, &mut seen, &mut out);
        assert_eq!(stats.loaded, 0);
        // Fallbacks from every kept layer should appear.
        assert!(out.iter().any(|d| d.layer == 2));
        assert!(out.iter().any(|d| d.layer == 1));
        assert!(out.iter().any(|d| d.layer == 0));
    }

    #[test]
    fn sphere_window_wrapping_selects_both_arcs() {
        let (mut img, _) = mk_image(8000.0, 4000.0, 1024);
        let mut host = NoopHost;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let ctx = TileContext::Sphere {
            window: SphereWindow {
                x0: 0.9,
                y0: 0.4,
                x1: 0.1,
                y1: 0.6,
                full_circle: false,
            },
            scale: 1.0,
        };
        img.get_tiles(&ctx, &mut host, &mut seen, &mut out);
        let finest = (img.layers.len() - 1) as u32;
        let cols: Vec<u32> = out
            .iter()
            .filter(|d| d.layer == finest)
            .map(|d| d.col)
            .collect();
        // Both the right edge and the left edge of the image are present.
        assert!(cols.contains(&0));
        assert!(cols.iter().any(|&c| c >= img.layers[finest as usize].cols - 1));
    }
}
