//! Geometry value types: logical views, screen viewports, conversion results
//! and per-tile draw instructions.
//!
//! `View` stores center + size canonically; corner values are derived. This
//! keeps spherical longitude wrap-safe: a cyclic center never produces the
//! ambiguous `x0 > x1` corner pair unless a caller asks for corners.

use serde::{Deserialize, Serialize};

use crate::ids::{ImageId, TileIndex};

/// Normalized logical viewport over image space [0,1]², plus the pan/zoom
/// limit rectangle navigation is clamped against.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    /// Limit rectangle `[x0, y0, x1, y1]`, independent of the view itself.
    pub limit: [f64; 4],
}

impl Default for View {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_y: 0.5,
            width: 1.0,
            height: 1.0,
            limit: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

impl View {
    pub fn new(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            center_x,
            center_y,
            width: width.max(1e-9),
            height: height.max(1e-9),
            ..Self::default()
        }
    }

    #[inline]
    pub fn x0(&self) -> f64 {
        self.center_x - self.width * 0.5
    }
    #[inline]
    pub fn y0(&self) -> f64 {
        self.center_y - self.height * 0.5
    }
    #[inline]
    pub fn x1(&self) -> f64 {
        self.center_x + self.width * 0.5
    }
    #[inline]
    pub fn y1(&self) -> f64 {
        self.center_y + self.height * 0.5
    }

    /// Rebuild from a corner pair. Width/height are kept strictly positive.
    pub fn set_corners(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) {
        self.width = (x1 - x0).max(1e-9);
        self.height = (y1 - y0).max(1e-9);
        self.center_x = x0 + self.width * 0.5;
        self.center_y = y0 + self.height * 0.5;
    }

    /// Corner buffer `[x0, y0, x1, y1]` for the host boundary.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x0(), self.y0(), self.x1(), self.y1()]
    }

    /// Wrap the horizontal center into [0,1). Spherical canvases call this
    /// after every mutation; flat canvases never do.
    #[inline]
    pub fn wrap_x(&mut self) {
        self.center_x = self.center_x.rem_euclid(1.0);
    }

    /// Enforce navigation bounds against the limit rectangle.
    ///
    /// Width and height are always preserved; the minimum-scale clamp lives
    /// in the camera, not here. An axis larger than the limit (the screen
    /// covers less than the configured minimum size) is recentered on it;
    /// otherwise the axis slides: a pan that would cross a limit edge moves
    /// the opposite edge instead. Idempotent.
    pub fn apply_limit(&mut self) {
        let [lx0, ly0, lx1, ly1] = self.limit;
        let lw = (lx1 - lx0).max(1e-9);
        let lh = (ly1 - ly0).max(1e-9);

        if self.width >= lw {
            self.center_x = lx0 + lw * 0.5;
        } else if self.x0() < lx0 {
            self.center_x = lx0 + self.width * 0.5;
        } else if self.x1() > lx1 {
            self.center_x = lx1 - self.width * 0.5;
        }

        if self.height >= lh {
            self.center_y = ly0 + lh * 0.5;
        } else if self.y0() < ly0 {
            self.center_y = ly0 + self.height * 0.5;
        } else if self.y1() > ly1 {
            self.center_y = ly1 - self.height * 0.5;
        }
    }

    /// True when the view currently violates its limit rectangle.
    pub fn outside_limit(&self) -> bool {
        let mut probe = *self;
        probe.apply_limit();
        (probe.center_x - self.center_x).abs() > 1e-9
            || (probe.center_y - self.center_y).abs() > 1e-9
            || (probe.width - self.width).abs() > 1e-9
            || (probe.height - self.height).abs() > 1e-9
    }

    /// Effective scale on a viewport: the more zoomed-in axis wins.
    pub fn scale(&self, vp: &Viewport, image_width: f64, image_height: f64) -> f64 {
        if !vp.is_valid() {
            return 0.0;
        }
        let sx = self.width * image_width / vp.width;
        let sy = self.height * image_height / vp.height;
        sx.max(sy).max(1e-12).recip()
    }

    /// Corner-delta metric normalized by the diagonal sizes, used purely to
    /// size animation durations. Sub-linear in jump size by design of the
    /// final square root.
    pub fn distance(&self, other: &View) -> f64 {
        let d0 = ((self.x0() - other.x0()).powi(2) + (self.y0() - other.y0()).powi(2)).sqrt();
        let d1 = ((self.x1() - other.x1()).powi(2) + (self.y1() - other.y1()).powi(2)).sqrt();
        let diag_a = (self.width * self.width + self.height * self.height).sqrt();
        let diag_b = (other.width * other.width + other.height * other.height).sqrt();
        let size_delta = (diag_a - diag_b).abs();
        ((d0.max(d1) + size_delta) / (diag_a + diag_b).max(1e-9)).sqrt()
    }

    /// Intersection with another rectangle in the same space, as corners.
    /// Returns `None` when the rectangles do not overlap.
    pub fn intersect(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Option<[f64; 4]> {
        let ix0 = self.x0().max(x0);
        let iy0 = self.y0().max(y0);
        let ix1 = self.x1().min(x1);
        let iy1 = self.y1().min(y1);
        if ix0 >= ix1 || iy0 >= iy1 {
            return None;
        }
        Some([ix0, iy0, ix1, iy1])
    }
}

/// Screen-space rectangle occupied by a canvas, scaled by device pixel ratio.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
    /// Device pixel ratio applied to incoming CSS pixel deltas.
    pub ratio: f64,
    /// Render scale supplied by the host on resize.
    pub scale: f64,
    pub portrait: bool,
    /// Temporary pixel constraint for partial-screen renders, as
    /// `[x, y, w, h]`; cleared by the next full resize.
    pub area: Option<[f64; 4]>,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            left: 0.0,
            top: 0.0,
            ratio: 1.0,
            scale: 1.0,
            portrait: false,
            area: None,
        }
    }
}

impl Viewport {
    /// Zero-size viewports are the "uninitialized" sentinel: scale math
    /// short-circuits until a valid resize arrives.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    #[inline]
    pub fn aspect(&self) -> f64 {
        if self.height <= 0.0 {
            1.0
        } else {
            self.width / self.height
        }
    }
}

/// Result of a coordinate conversion, exposed to the host as a flat buffer
/// `[x, y, scale, depth, direction]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Signed w from projection; negative means in front of the camera.
    pub depth: f64,
    /// Viewing direction (yaw) the conversion was made at, radians.
    pub direction: f64,
}

impl Coordinates {
    pub fn to_array(&self) -> [f64; 5] {
        [self.x, self.y, self.scale, self.depth, self.direction]
    }
}

/// One tile draw instruction queued by tile selection and consumed by
/// `Canvas::draw`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DrawRect {
    pub layer: u32,
    pub tile: TileIndex,
    pub image: ImageId,
    pub col: u32,
    pub row: u32,
    /// Whether this tile belongs to the resolution the camera actually wants,
    /// as opposed to a coarser fallback kept for coverage.
    pub target_layer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_roundtrip_through_center_size() {
        let mut v = View::default();
        v.set_corners(0.2, 0.3, 0.6, 0.5);
        let [x0, y0, x1, y1] = v.to_array();
        assert!((x0 - 0.2).abs() < 1e-12);
        assert!((y0 - 0.3).abs() < 1e-12);
        assert!((x1 - 0.6).abs() < 1e-12);
        assert!((y1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn limit_slides_edges_preserving_size() {
        let mut v = View::new(0.05, 0.5, 0.2, 0.2);
        v.apply_limit();
        assert!((v.x0() - 0.0).abs() < 1e-12);
        assert!((v.width - 0.2).abs() < 1e-12);
    }

    #[test]
    fn limit_recenter_when_zoomed_out_past_minimum() {
        let mut v = View::new(0.1, 0.1, 3.0, 3.0);
        v.apply_limit();
        assert!((v.center_x - 0.5).abs() < 1e-12);
        assert!((v.center_y - 0.5).abs() < 1e-12);
        // Size is preserved; the camera's scale clamp owns the minimum.
        assert!((v.width - 3.0).abs() < 1e-12);
    }

    #[test]
    fn limit_is_idempotent() {
        let mut v = View::new(0.9, 0.02, 0.3, 0.1);
        v.apply_limit();
        let once = v;
        v.apply_limit();
        assert_eq!(once, v);
    }
}
