//! 2D camera: pan/zoom/pinch and scale-limit computation for flat images.
//!
//! `set_view` is the single authority converting the logical View into an
//! effective scale; every other operation mutates the View and runs through
//! it. Orchestration (kinetic feeding, corrective animations) lives in the
//! canvas; the camera is the math.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::view::{Coordinates, View, Viewport};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Camera {
    pub scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Scale that exactly covers the viewport.
    pub cover_scale: f64,
    /// Scale that exactly contains the image.
    pub full_scale: f64,

    /// Pan/zoom limits are suspended and overzoom permitted while pinching.
    pinching: bool,
    pinch_prev: Option<(f64, f64, f64)>,

    free_move: bool,
    cover_limit: bool,
}

impl Camera {
    pub fn new(free_move: bool, cover_limit: bool) -> Self {
        Self {
            scale: 0.0,
            min_scale: 0.0,
            max_scale: 1.0,
            cover_scale: 0.0,
            full_scale: 0.0,
            pinching: false,
            pinch_prev: None,
            free_move,
            cover_limit,
        }
    }

    /// Recompute the scale landmarks for a viewport / image pairing.
    pub fn resize(&mut self, vp: &Viewport, image_w: f64, image_h: f64, cfg: &Config) {
        if !vp.is_valid() || image_w <= 0.0 || image_h <= 0.0 {
            // Uninitialized sentinel: set_view short-circuits until a valid
            // resize arrives.
            self.full_scale = 0.0;
            self.cover_scale = 0.0;
            return;
        }
        let sx = vp.width / image_w;
        let sy = vp.height / image_h;
        self.full_scale = sx.min(sy);
        self.cover_scale = sx.max(sy);
        self.min_scale = if self.cover_limit {
            self.cover_scale
        } else {
            self.full_scale
        };
        self.max_scale = cfg.max_scale.max(self.min_scale);
    }

    /// Convert the logical View into an effective scale, then expand the View
    /// symmetrically to exactly fill the viewport aspect ratio.
    pub fn set_view(&mut self, view: &mut View, vp: &Viewport, image_w: f64, image_h: f64, cfg: &Config) {
        if !vp.is_valid() || self.full_scale <= 0.0 {
            return;
        }

        // Contain: the smaller per-axis ratio fits the requested view.
        let sx = vp.width / (view.width * image_w).max(1e-12);
        let sy = vp.height / (view.height * image_h).max(1e-12);
        let mut scale = sx.min(sy);

        if !self.pinching && !self.free_move {
            scale = scale.clamp(self.min_scale * cfg.min_size, self.max_scale);
        }

        view.width = vp.width / (scale * image_w);
        view.height = vp.height / (scale * image_h);
        if !self.free_move {
            view.apply_limit();
        }
        self.scale = scale;
    }

    /// Screen pixel delta → normalized image delta at the current scale.
    pub fn pan_delta(&self, vp: &Viewport, image_w: f64, image_h: f64, dx_px: f64, dy_px: f64) -> (f64, f64) {
        if self.scale <= 0.0 || image_w <= 0.0 || image_h <= 0.0 {
            return (0.0, 0.0);
        }
        let r = vp.ratio.max(1e-9);
        (
            dx_px * r / (self.scale * image_w),
            dy_px * r / (self.scale * image_h),
        )
    }

    /// Target view for a zoom step anchored at a screen point: the image
    /// point under `(px, py)` stays fixed. `delta` is an exponent: +1
    /// doubles the visible area, −1 halves it.
    pub fn zoom_target(
        &self,
        view: &View,
        vp: &Viewport,
        image_w: f64,
        image_h: f64,
        delta: f64,
        px: f64,
        py: f64,
        cfg: &Config,
    ) -> View {
        if !vp.is_valid() || self.scale <= 0.0 {
            return *view;
        }
        let mut factor = 2f64.powf(delta);

        if !self.pinching && !self.free_move {
            // Pre-clamp the factor so the resulting scale stays in bounds.
            let min_w = vp.width / (self.max_scale * image_w);
            let max_w = (vp.width / ((self.min_scale * cfg.min_size).max(1e-12) * image_w))
                .max(min_w);
            factor = factor.clamp(min_w / view.width, max_w / view.width);
        }

        let r = vp.ratio.max(1e-9);
        let fx = (px * r / vp.width).clamp(0.0, 1.0);
        let fy = (py * r / vp.height).clamp(0.0, 1.0);
        let anchor_x = view.x0() + fx * view.width;
        let anchor_y = view.y0() + fy * view.height;

        let new_w = view.width * factor;
        let new_h = view.height * factor;
        let mut target = *view;
        target.set_corners(
            anchor_x - fx * new_w,
            anchor_y - fy * new_h,
            anchor_x + (1.0 - fx) * new_w,
            anchor_y + (1.0 - fy) * new_h,
        );
        if !self.free_move {
            target.apply_limit();
        }
        target
    }

    /// Screen px → normalized image coordinates. Linear because set_view
    /// keeps the View exactly aspect-matched to the viewport.
    pub fn get_coo(&self, view: &View, vp: &Viewport, px: f64, py: f64) -> Coordinates {
        if !vp.is_valid() {
            return Coordinates::default();
        }
        let r = vp.ratio.max(1e-9);
        Coordinates {
            x: view.x0() + (px * r / vp.width) * view.width,
            y: view.y0() + (py * r / vp.height) * view.height,
            scale: self.scale,
            depth: 0.0,
            direction: 0.0,
        }
    }

    /// Normalized image coordinates → screen px. Exact inverse of `get_coo`.
    pub fn get_xy(&self, view: &View, vp: &Viewport, x: f64, y: f64) -> Coordinates {
        if !vp.is_valid() || view.width <= 0.0 || view.height <= 0.0 {
            return Coordinates::default();
        }
        let r = vp.ratio.max(1e-9);
        Coordinates {
            x: (x - view.x0()) / view.width * vp.width / r,
            y: (y - view.y0()) / view.height * vp.height / r,
            scale: self.scale,
            depth: 0.0,
            direction: 0.0,
        }
    }

    /// Begin a two-finger gesture: limits off, overzoom on.
    pub fn pinch_start(&mut self) {
        self.pinching = true;
        self.pinch_prev = None;
    }

    /// One pinch update. Returns the pan delta (screen px) and zoom exponent
    /// derived from the change in centroid and span since the previous call.
    pub fn pinch(&mut self, cx: f64, cy: f64, span: f64) -> Option<(f64, f64, f64)> {
        if !self.pinching {
            return None;
        }
        let span = span.max(1e-6);
        let out = self.pinch_prev.map(|(pcx, pcy, pspan)| {
            // Content follows the fingers: the view moves opposite the
            // centroid; spreading fingers zooms in.
            (pcx - cx, pcy - cy, (pspan / span).log2())
        });
        self.pinch_prev = Some((cx, cy, span));
        out
    }

    /// End the gesture. Returns `true` when the resulting view needs a
    /// snap-back correction (overzoom or out of limits).
    pub fn pinch_stop(&mut self, view: &View, cfg: &Config) -> bool {
        self.pinching = false;
        self.pinch_prev = None;
        if self.free_move {
            return false;
        }
        let over = self.scale > self.max_scale + 1e-9
            || self.scale < self.min_scale * cfg.min_size - 1e-9;
        over || view.outside_limit()
    }

    #[inline]
    pub fn is_pinching(&self) -> bool {
        self.pinching
    }

    #[inline]
    pub fn free_move(&self) -> bool {
        self.free_move
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Camera, View, Viewport, Config) {
        let mut cam = Camera::new(false, false);
        let view = View::default();
        let vp = Viewport {
            width: 500.0,
            height: 500.0,
            ..Default::default()
        };
        let cfg = Config::default();
        cam.resize(&vp, 2000.0, 1000.0, &cfg);
        (cam, view, vp, cfg)
    }

    #[test]
    fn full_and_cover_scale_from_viewport() {
        let (cam, _, _, _) = setup();
        assert!((cam.full_scale - 0.25).abs() < 1e-12);
        assert!((cam.cover_scale - 0.5).abs() < 1e-12);
    }

    #[test]
    fn set_view_expands_to_viewport_aspect() {
        let (mut cam, mut view, vp, cfg) = setup();
        cam.set_view(&mut view, &vp, 2000.0, 1000.0, &cfg);
        // Full image at full_scale: view spans the whole width, expands
        // vertically past [0,1] to match the square viewport.
        assert!((cam.scale - 0.25).abs() < 1e-12);
        assert!((view.width - 1.0).abs() < 1e-12);
        assert!((view.height - 2.0).abs() < 1e-12);
    }

    #[test]
    fn coordinate_roundtrip() {
        let (mut cam, mut view, vp, cfg) = setup();
        cam.set_view(&mut view, &vp, 2000.0, 1000.0, &cfg);
        for (px, py) in [(10.0, 20.0), (250.0, 250.0), (490.0, 33.0)] {
            let coo = cam.get_coo(&view, &vp, px, py);
            let back = cam.get_xy(&view, &vp, coo.x, coo.y);
            assert!((back.x - px).abs() < 1e-9, "x {px} -> {}", back.x);
            assert!((back.y - py).abs() < 1e-9, "y {py} -> {}", back.y);
        }
    }

    #[test]
    fn zoom_target_keeps_anchor_fixed() {
        let (mut cam, mut view, vp, cfg) = setup();
        cam.set_view(&mut view, &vp, 2000.0, 1000.0, &cfg);
        let before = cam.get_coo(&view, &vp, 100.0, 100.0);
        let target = cam.zoom_target(&view, &vp, 2000.0, 1000.0, -0.5, 100.0, 100.0, &cfg);
        // Fraction across the target view at the anchor image point matches
        // the screen fraction.
        let fx = (before.x - target.x0()) / target.width;
        assert!((fx - 100.0 / 500.0).abs() < 1e-9);
    }

    #[test]
    fn scale_clamped_without_free_move() {
        let (mut cam, mut view, vp, cfg) = setup();
        // Absurdly deep zoom request.
        view.width = 1e-6;
        view.height = 1e-6;
        cam.set_view(&mut view, &vp, 2000.0, 1000.0, &cfg);
        assert!(cam.scale <= cam.max_scale + 1e-12);
        // Absurdly far zoom out.
        view.width = 100.0;
        view.height = 100.0;
        cam.set_view(&mut view, &vp, 2000.0, 1000.0, &cfg);
        assert!(cam.scale >= cam.min_scale * cfg.min_size - 1e-12);
    }

    #[test]
    fn pinch_derives_pan_and_zoom() {
        let (mut cam, _, _, _) = setup();
        cam.pinch_start();
        assert!(cam.pinch(100.0, 100.0, 50.0).is_none());
        let (dx, _dy, dz) = cam.pinch(110.0, 100.0, 100.0).unwrap();
        assert!((dx + 10.0).abs() < 1e-12);
        assert!((dz + 1.0).abs() < 1e-12, "span doubled -> one level in");
    }
}
