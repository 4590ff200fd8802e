//! Spherical (360°) camera: yaw/pitch/perspective model and 3D↔screen
//! projection.
//!
//! Image space maps onto the unit sphere equirectangularly: x is longitude
//! (cyclic, seam at x = 0), y is latitude with 0.5 on the equator.
//! `perspective` is the vertical field of view in radians; smaller means
//! more zoomed in.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::math::{Mat4, Vec4};
use crate::view::{Coordinates, View, Viewport};

/// Latitude/longitude window covering everything visible on screen, used for
/// spherical tile selection. Longitude may wrap (`x0 > x1` crosses the seam).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SphereWindow {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    /// The whole longitude circle is visible (a pole is on screen).
    pub full_circle: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Spherical {
    pub yaw: f64,
    pub pitch: f64,
    pub perspective: f64,
    pub min_perspective: f64,
    pub max_perspective: f64,

    /// Optional yaw range, radians. `None` allows full rotation.
    pub yaw_limit: Option<(f64, f64)>,
    /// Optional pitch range, radians. When set, the frustum is kept off the
    /// poles by shrinking the range by half the field of view.
    pub pitch_limit: Option<(f64, f64)>,

    /// Rotation offset aligning the image's origin (true north), radians.
    pub true_north: f64,

    /// Positional offset for transition motion between adjacent scenes.
    pub offset: [f64; 3],

    #[serde(skip)]
    matrix: Mat4,
    #[serde(skip, default = "Mat4::identity")]
    inverse: Mat4,
    #[serde(skip)]
    aspect: f64,
}

impl Spherical {
    pub fn new(cfg: &Config, true_north: f64) -> Self {
        let mut s = Self {
            yaw: 0.0,
            pitch: 0.0,
            perspective: 1.0,
            min_perspective: cfg.min_perspective,
            max_perspective: cfg.max_perspective,
            yaw_limit: None,
            pitch_limit: None,
            true_north,
            offset: [0.0; 3],
            matrix: Mat4::identity(),
            inverse: Mat4::identity(),
            aspect: 1.0,
        };
        s.update_matrix(&Viewport::default());
        s
    }

    /// Rebuild the projection matrix after any orientation, perspective,
    /// offset or viewport change.
    pub fn update_matrix(&mut self, vp: &Viewport) {
        self.aspect = vp.aspect();
        let proj = Mat4::perspective(self.perspective, self.aspect, 0.01, 100.0);
        let rotated = proj
            .multiply(&Mat4::rotation_x(-self.pitch))
            .multiply(&Mat4::rotation_y(self.yaw));
        self.matrix = rotated.multiply(&Mat4::translation(
            -self.offset[0],
            -self.offset[1],
            -self.offset[2],
        ));
        // The inverse skips the positional offset: unprojection wants the
        // viewing ray, and the offset only exists for transition fades.
        self.inverse = rotated.inverted().unwrap_or_else(Mat4::identity);
    }

    /// Pixel drag → orientation change. Rotation slows down proportionally
    /// to zoom (the visible angle per pixel shrinks with the fov).
    pub fn rotate(&mut self, vp: &Viewport, dx_px: f64, dy_px: f64) {
        if !vp.is_valid() {
            return;
        }
        let r = vp.ratio.max(1e-9);
        let per_px = self.perspective / vp.height.max(1.0);
        self.set_direction(
            self.yaw + dx_px * r * per_px,
            self.pitch + dy_px * r * per_px,
        );
    }

    /// Set yaw/pitch directly, wrapping yaw into [0, 2π) and clamping pitch
    /// against the configured limits (frustum kept off the poles).
    pub fn set_direction(&mut self, yaw: f64, pitch: f64) {
        let half_fov = self.perspective * 0.5;
        self.yaw = match self.yaw_limit {
            Some((lo, hi)) if lo <= hi => yaw.clamp(lo, hi),
            _ => yaw.rem_euclid(TAU),
        };
        let (lo, hi) = match self.pitch_limit {
            Some((lo, hi)) => (lo + half_fov, hi - half_fov),
            None => (-FRAC_PI_2, FRAC_PI_2),
        };
        // A limit narrower than the fov collapses to its midpoint.
        self.pitch = if lo > hi {
            (lo + hi) * 0.5
        } else {
            pitch.clamp(lo, hi)
        };
    }

    /// Multiplicative perspective zoom; +1 doubles the fov (out), −1 halves
    /// it (in). Returns the clamped target without applying it, so callers
    /// can animate toward it.
    pub fn zoom_target(&self, delta: f64) -> f64 {
        (self.perspective * 2f64.powf(delta)).clamp(self.min_perspective, self.max_perspective)
    }

    pub fn set_perspective(&mut self, p: f64) {
        self.perspective = p.clamp(self.min_perspective, self.max_perspective);
    }

    /// Screen pixels per source-image pixel at the view center.
    pub fn scale(&self, vp: &Viewport, image_width: f64) -> f64 {
        if !vp.is_valid() || image_width <= 0.0 {
            return 0.0;
        }
        let half = (self.perspective * 0.5).tan().max(1e-9);
        let visible_h = 2.0 * (half * self.aspect).atan();
        (vp.width / visible_h) / (image_width / TAU)
    }

    /// Unproject a screen pixel to normalized image coordinates via the
    /// inverse projection matrix.
    pub fn get_coo(&self, vp: &Viewport, px: f64, py: f64) -> Coordinates {
        if !vp.is_valid() {
            return Coordinates::default();
        }
        let r = vp.ratio.max(1e-9);
        let nx = (px * r / vp.width) * 2.0 - 1.0;
        let ny = 1.0 - (py * r / vp.height) * 2.0;

        let near = self.inverse.project(&Vec4::position(nx, ny, -1.0));
        let far = self.inverse.project(&Vec4::position(nx, ny, 1.0));
        let dir = Vec4::direction(far.x - near.x, far.y - near.y, far.z - near.z).normalized();

        let theta = dir.x.atan2(-dir.z);
        let phi = dir.y.clamp(-1.0, 1.0).asin();
        Coordinates {
            x: ((theta - self.true_north) / TAU + 0.5).rem_euclid(1.0),
            y: phi / PI + 0.5,
            scale: 0.0,
            depth: 0.0,
            direction: self.yaw,
        }
    }

    /// Project normalized image coordinates to screen pixels. Exact inverse
    /// of `get_coo`; `depth < 0` means the point is in front of the camera.
    pub fn get_xyz(&self, vp: &Viewport, x: f64, y: f64) -> Coordinates {
        if !vp.is_valid() {
            return Coordinates::default();
        }
        let p = self.sphere_point(x, y);
        let clip = self.matrix.transform(&p);
        let w = if clip.w.abs() <= 1e-12 { 1e-12 } else { clip.w };
        let r = vp.ratio.max(1e-9);
        Coordinates {
            x: (clip.x / w * 0.5 + 0.5) * vp.width / r,
            y: (0.5 - clip.y / w * 0.5) * vp.height / r,
            scale: 0.0,
            depth: -clip.w,
            direction: self.yaw,
        }
    }

    /// Placement matrix for an embedded sub-image: translate to the sphere
    /// point, rotate to face the camera basis with the embed's own rotation,
    /// then scale. Consumed by the host as a 3D transform.
    pub fn get_matrix(
        &self,
        x: f64,
        y: f64,
        rotation: [f64; 3],
        scale: f64,
        radius: f64,
    ) -> Mat4 {
        let theta = (x - 0.5) * TAU + self.true_north;
        let phi = (y - 0.5) * PI;
        Mat4::rotation_y(-theta)
            .multiply(&Mat4::rotation_x(phi))
            .multiply(&Mat4::translation(0.0, 0.0, -radius))
            .multiply(&Mat4::rotation_z(rotation[2]))
            .multiply(&Mat4::rotation_y(rotation[1]))
            .multiply(&Mat4::rotation_x(rotation[0]))
            .multiply(&Mat4::scaling(scale, scale, scale))
    }

    #[inline]
    pub fn projection(&self) -> &Mat4 {
        &self.matrix
    }

    /// Unit-sphere surface point for normalized image coordinates.
    fn sphere_point(&self, x: f64, y: f64) -> Vec4 {
        let theta = (x - 0.5) * TAU + self.true_north;
        let phi = (y - 0.5) * PI;
        Vec4::position(
            phi.cos() * theta.sin(),
            phi.sin(),
            -(phi.cos() * theta.cos()),
        )
    }

    /// Longitude/latitude window covering the screen, by directional
    /// sampling: a rectangle in image space is not a rectangle on screen
    /// near the poles or across the seam, so sample a screen grid, convert,
    /// and take the minimal covering band and wrap-aware arc.
    pub fn visible_window(&self, vp: &Viewport) -> SphereWindow {
        const COLS: usize = 7;
        const ROWS: usize = 5;

        if !vp.is_valid() {
            return SphereWindow {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
                full_circle: true,
            };
        }

        let r = vp.ratio.max(1e-9);
        let center = self.get_coo(vp, vp.width * 0.5 / r, vp.height * 0.5 / r);

        let mut lat_min = f64::MAX;
        let mut lat_max = f64::MIN;
        let mut lon_min = f64::MAX;
        let mut lon_max = f64::MIN;

        for row in 0..ROWS {
            for col in 0..COLS {
                let px = vp.width * col as f64 / (COLS - 1) as f64 / r;
                let py = vp.height * row as f64 / (ROWS - 1) as f64 / r;
                let coo = self.get_coo(vp, px, py);
                lat_min = lat_min.min(coo.y);
                lat_max = lat_max.max(coo.y);
                // Unwrap each longitude around the view center so the arc
                // stays minimal across the seam.
                let d = (coo.x - center.x + 0.5).rem_euclid(1.0) - 0.5;
                lon_min = lon_min.min(d);
                lon_max = lon_max.max(d);
            }
        }

        // Conservative margin: half the angular spacing of the sample grid,
        // so features falling between samples stay covered.
        let margin_x = (lon_max - lon_min) / (COLS - 1) as f64 * 0.5;
        let margin_y = (lat_max - lat_min) / (ROWS - 1) as f64 * 0.5;
        lat_min -= margin_y;
        lat_max += margin_y;
        lon_min -= margin_x;
        lon_max += margin_x;

        // Pole handling: when the frustum reaches a pole the longitude arc
        // degenerates and every longitude is visible.
        let pole_eps = self.perspective / (ROWS - 1) as f64 * 0.5;
        let half_fov = self.perspective * 0.5;
        let up = self.pitch + half_fov >= FRAC_PI_2 - pole_eps;
        let down = self.pitch - half_fov <= -(FRAC_PI_2 - pole_eps);
        if up || down {
            return SphereWindow {
                x0: 0.0,
                y0: if down { 0.0 } else { lat_min.max(0.0) },
                x1: 1.0,
                y1: if up { 1.0 } else { lat_max.min(1.0) },
                full_circle: true,
            };
        }

        SphereWindow {
            x0: (center.x + lon_min).rem_euclid(1.0),
            y0: lat_min.max(0.0),
            x1: (center.x + lon_max).rem_euclid(1.0),
            y1: lat_max.min(1.0),
            full_circle: lon_max - lon_min >= 1.0,
        }
    }

    /// The logical View mirror of the current orientation, kept on the
    /// canvas so animations can interpolate it like any flat view.
    pub fn as_view(&self) -> View {
        let mut v = View::new(
            ((self.yaw - self.true_north) / TAU + 0.5).rem_euclid(1.0),
            self.pitch / PI + 0.5,
            self.perspective / TAU,
            self.perspective / PI,
        );
        v.wrap_x();
        v
    }

    /// Apply an interpolated View back onto the orientation.
    pub fn apply_view(&mut self, view: &View) {
        let yaw = (view.center_x - 0.5) * TAU + self.true_north;
        let pitch = (view.center_y - 0.5) * PI;
        self.set_direction(yaw, pitch);
    }
}
