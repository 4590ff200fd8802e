//! Canvas: one rendering surface.
//!
//! Owns a View, a Viewport, a 2D camera or a spherical controller, an Ani, a
//! Kinetic and an ordered list of Images; drives the per-frame
//! `should_draw`/`draw` cycle and nests child canvases for grid layouts.

use std::f64::consts::TAU;

use hashbrown::HashSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ani::{Ani, AniOptions};
use crate::camera::Camera;
use crate::config::Config;
use crate::ease::Bicubic;
use crate::error::EngineError;
use crate::host::HostHooks;
use crate::ids::{CanvasId, IdAllocator, TileIndex};
use crate::image::{Image, ImageInfo, TileContext, TileStats};
use crate::kinetic::Kinetic;
use crate::spherical::Spherical;
use crate::view::{Coordinates, DrawRect, View, Viewport};

/// Omni object parameters: a rotatable subject as a ring (or stacked rings)
/// of frame images.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OmniInfo {
    /// Frames per ring.
    pub frames: u32,
    /// Number of vertical rings.
    pub layers: u32,
}

/// Static construction descriptor for a canvas.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasInfo {
    pub is_360: bool,
    pub free_move: bool,
    pub cover_limit: bool,
    /// Rotation offset aligning a spherical image's origin, radians.
    pub true_north: f64,
    /// Paged gallery: one active image at a time over a background quad.
    pub gallery: bool,
    pub omni: Option<OmniInfo>,
    /// Pan/zoom limit rectangle, `[x0, y0, x1, y1]`.
    pub limit: Option<[f64; 4]>,
    /// Grid placement within the parent canvas, `[x0, y0, x1, y1]`.
    pub area: Option<[f64; 4]>,
    pub images: Vec<ImageInfo>,
}

/// Parse a canvas descriptor from JSON (the wasm adapter's construction
/// path).
pub fn parse_canvas_info_json(s: &str) -> Result<CanvasInfo, EngineError> {
    Ok(serde_json::from_str(s)?)
}

/// The mutually exclusive camera mode, selected once by the `is_360` flag.
#[derive(Clone, Debug)]
pub enum Controller {
    Flat(Camera),
    Sphere(Spherical),
}

/// Area-transition state for grid membership changes.
#[derive(Clone, Copy, Debug)]
struct AreaAni {
    from: [f64; 4],
    start: f64,
    running: bool,
}

pub struct Canvas {
    pub id: CanvasId,
    pub info: CanvasInfo,
    pub view: View,
    pub viewport: Viewport,
    pub controller: Controller,
    pub ani: Ani,
    pub kinetic: Kinetic,
    pub images: Vec<Image>,
    pub children: Vec<Canvas>,

    pub opacity: f64,
    pub target_opacity: f64,
    /// Active image for galleries and omni objects.
    pub active_image: usize,
    omni_ring: u32,

    /// Grid area: where the canvas currently sits, and where it is heading.
    pub current_area: [f64; 4],
    pub target_area: [f64; 4],
    area_ani: AreaAni,

    /// Positional fade direction for spherical scene-to-scene transitions.
    transition: Option<[f64; 3]>,

    draw_list: Vec<DrawRect>,
    seen: HashSet<TileIndex>,
    animating: bool,
    visible_notified: bool,
}

impl Canvas {
    pub fn new(
        id: CanvasId,
        info: CanvasInfo,
        cfg: &Config,
        ids: &mut IdAllocator,
    ) -> Result<Self, EngineError> {
        let mut images = Vec::with_capacity(info.images.len());
        for image_info in &info.images {
            images.push(Image::new(ids.alloc_image(), image_info.clone(), ids)?);
        }
        // Paged surfaces show one image at a time; the rest wait at zero.
        if info.gallery || info.omni.is_some() {
            for (i, img) in images.iter_mut().enumerate() {
                img.target_opacity = if i == 0 { 1.0 } else { 0.0 };
            }
        }

        let controller = if info.is_360 {
            Controller::Sphere(Spherical::new(cfg, info.true_north))
        } else {
            Controller::Flat(Camera::new(info.free_move, info.cover_limit))
        };

        let mut view = View::default();
        if let Some(limit) = info.limit {
            view.limit = limit;
        }
        let area = info.area.unwrap_or([0.0, 0.0, 1.0, 1.0]);

        debug!("canvas {:?} created ({} images, 360={})", id, images.len(), info.is_360);
        Ok(Self {
            id,
            view,
            viewport: Viewport::default(),
            controller,
            ani: Ani::new(),
            kinetic: Kinetic::new(),
            images,
            children: Vec::new(),
            opacity: 0.0,
            // Fade-in starts only once the base tile is confirmed drawn.
            target_opacity: 0.0,
            active_image: 0,
            omni_ring: 0,
            current_area: area,
            target_area: area,
            area_ani: AreaAni {
                from: area,
                start: 0.0,
                running: false,
            },
            transition: None,
            draw_list: Vec::new(),
            seen: HashSet::new(),
            animating: false,
            visible_notified: false,
            info,
        })
    }

    /// Primary image dimensions (active image for galleries/omni).
    fn image_dims(&self) -> (f64, f64) {
        match self.images.get(self.active_image.min(self.images.len().saturating_sub(1))) {
            Some(img) => (img.info.width, img.info.height),
            None => (0.0, 0.0),
        }
    }

    // ---- geometry -------------------------------------------------------

    /// Apply a new screen rectangle. Children derive theirs from their area.
    #[allow(clippy::too_many_arguments)]
    pub fn resize(
        &mut self,
        width: f64,
        height: f64,
        left: f64,
        top: f64,
        ratio: f64,
        scale: f64,
        portrait: bool,
        cfg: &Config,
        host: &mut dyn HostHooks,
    ) {
        // A full resize clears any temporary partial-screen render area.
        self.viewport = Viewport {
            width,
            height,
            left,
            top,
            ratio: ratio.max(1e-3),
            scale,
            portrait,
            area: None,
        };
        let (iw, ih) = self.image_dims();
        match &mut self.controller {
            Controller::Flat(cam) => {
                cam.resize(&self.viewport, iw, ih, cfg);
                cam.set_view(&mut self.view, &self.viewport, iw, ih, cfg);
            }
            Controller::Sphere(sphere) => {
                sphere.update_matrix(&self.viewport);
            }
        }
        host.viewport_set(self.id, left, top, width, height);
        host.view_set(self.id);

        for child in &mut self.children {
            child.resize_from_parent(&self.viewport, cfg, host);
        }
    }

    fn resize_from_parent(&mut self, parent: &Viewport, cfg: &Config, host: &mut dyn HostHooks) {
        let [x0, y0, x1, y1] = self.current_area;
        self.resize(
            (x1 - x0) * parent.width,
            (y1 - y0) * parent.height,
            parent.left + x0 * parent.width,
            parent.top + y0 * parent.height,
            parent.ratio,
            parent.scale,
            parent.portrait,
            cfg,
            host,
        );
    }

    /// Set the view directly (no animation).
    pub fn set_view(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, cfg: &Config, host: &mut dyn HostHooks) {
        self.view.set_corners(x0, y0, x1, y1);
        let (iw, ih) = self.image_dims();
        match &mut self.controller {
            Controller::Flat(cam) => cam.set_view(&mut self.view, &self.viewport, iw, ih, cfg),
            Controller::Sphere(sphere) => {
                sphere.apply_view(&self.view);
                self.view = sphere.as_view();
                sphere.update_matrix(&self.viewport);
            }
        }
        host.view_set(self.id);
    }

    /// Set spherical orientation directly.
    pub fn set_view_360(&mut self, yaw: f64, pitch: f64, perspective: f64, host: &mut dyn HostHooks) {
        if let Controller::Sphere(sphere) = &mut self.controller {
            sphere.set_perspective(perspective);
            sphere.set_direction(yaw, pitch);
            sphere.update_matrix(&self.viewport);
            self.view = sphere.as_view();
            host.view_set(self.id);
        }
    }

    /// Screen px → image coordinates for the current camera mode.
    pub fn get_coo(&self, px: f64, py: f64) -> Coordinates {
        match &self.controller {
            Controller::Flat(cam) => cam.get_coo(&self.view, &self.viewport, px, py),
            Controller::Sphere(sphere) => {
                let (iw, _) = self.image_dims();
                let mut coo = sphere.get_coo(&self.viewport, px, py);
                coo.scale = sphere.scale(&self.viewport, iw);
                coo
            }
        }
    }

    /// Image coordinates → screen px (flat) or screen px + depth (sphere).
    pub fn get_xy(&self, x: f64, y: f64) -> Coordinates {
        match &self.controller {
            Controller::Flat(cam) => cam.get_xy(&self.view, &self.viewport, x, y),
            Controller::Sphere(sphere) => {
                let (iw, _) = self.image_dims();
                let mut coo = sphere.get_xyz(&self.viewport, x, y);
                coo.scale = sphere.scale(&self.viewport, iw);
                coo
            }
        }
    }

    // ---- navigation -----------------------------------------------------

    /// Animate toward a target view. Negative duration asks for the
    /// auto-computed one; `jump` selects per-edge easing.
    #[allow(clippy::too_many_arguments)]
    pub fn fly_to(
        &mut self,
        mut target: View,
        duration_ms: f64,
        jump: bool,
        now: f64,
        cfg: &Config,
        host: &mut dyn HostHooks,
    ) {
        self.kinetic.stop();
        // Normalize the target up front (scale clamp + aspect expansion), so
        // the animation ends exactly on the view it will settle at.
        if let Controller::Flat(cam) = &self.controller {
            let (iw, ih) = self.image_dims();
            let mut probe = cam.clone();
            probe.set_view(&mut target, &self.viewport, iw, ih, cfg);
        }
        let duration = if duration_ms < 0.0 {
            Ani::auto_duration(&self.view, &target, &self.viewport, cfg)
        } else {
            duration_ms
        };
        let opts = AniOptions {
            jump,
            wrap: self.info.is_360,
            perspective: None,
            ..Default::default()
        };
        if self
            .ani
            .to_view(&self.view, target, duration, Bicubic::EASE, now, opts)
        {
            host.ani_abort(self.id);
        }
    }

    /// Center on an image point at an optional scale.
    #[allow(clippy::too_many_arguments)]
    pub fn set_coo(
        &mut self,
        x: f64,
        y: f64,
        scale: f64,
        duration_ms: f64,
        now: f64,
        cfg: &Config,
        host: &mut dyn HostHooks,
    ) {
        let (iw, ih) = self.image_dims();
        let mut target = self.view;
        if scale > 0.0 && self.viewport.is_valid() && iw > 0.0 {
            target.width = self.viewport.width / (scale * iw);
            target.height = self.viewport.height / (scale * ih.max(1e-9));
        }
        target.center_x = x;
        target.center_y = y;
        if !self.info.is_360 && !matches!(self.controller, Controller::Flat(ref c) if c.free_move()) {
            target.apply_limit();
        }
        self.fly_to(target, duration_ms, false, now, cfg, host);
    }

    /// Pan by a screen-pixel delta.
    pub fn pan(&mut self, dx: f64, dy: f64, from_kinetic: bool, now: f64, cfg: &Config, host: &mut dyn HostHooks) {
        // User input supersedes a running fly-to (corrections keep running;
        // they are folded into the pan path below).
        if !from_kinetic && self.ani.is_running() && !self.ani.is_correcting() && self.ani.stop() {
            host.ani_abort(self.id);
        }
        let (iw, ih) = self.image_dims();
        match &mut self.controller {
            Controller::Sphere(sphere) => {
                sphere.rotate(&self.viewport, dx, dy);
                sphere.update_matrix(&self.viewport);
                self.view = sphere.as_view();
                if !from_kinetic {
                    self.kinetic.add(dx, dy, now, cfg.kinetic_elasticity);
                }
                host.view_set(self.id);
            }
            Controller::Flat(cam) => {
                let (ddx, ddy) = cam.pan_delta(&self.viewport, iw, ih, dx, dy);
                if cam.is_pinching() {
                    self.view.center_x += ddx;
                    self.view.center_y += ddy;
                } else if self.view.outside_limit() && !from_kinetic && !cam.free_move() {
                    // Already out of bounds: a short correction instead of a
                    // hard clamp, so the view glides back.
                    let mut target = self.view;
                    target.center_x += ddx;
                    target.center_y += ddy;
                    target.apply_limit();
                    let opts = AniOptions {
                        correcting: true,
                        wrap: self.info.is_360,
                        ..Default::default()
                    };
                    if self
                        .ani
                        .to_view(&self.view, target, 200.0, Bicubic::EASE_OUT, now, opts)
                    {
                        host.ani_abort(self.id);
                    }
                } else {
                    self.view.center_x += ddx;
                    self.view.center_y += ddy;
                    if !cam.free_move() {
                        self.view.apply_limit();
                    }
                    if !from_kinetic {
                        self.kinetic.add(dx, dy, now, cfg.kinetic_elasticity);
                    }
                    host.view_set(self.id);
                }
            }
        }
    }

    /// End a drag gesture: hand remaining momentum to the kinetic model.
    pub fn pan_stop(&mut self, now: f64) {
        self.kinetic.release(now);
    }

    /// Zoom by an exponent anchored at a screen point, always through the
    /// animation controller; duration 0 applies on this frame.
    #[allow(clippy::too_many_arguments)]
    pub fn zoom(
        &mut self,
        delta: f64,
        px: f64,
        py: f64,
        duration_ms: f64,
        now: f64,
        cfg: &Config,
        host: &mut dyn HostHooks,
    ) {
        self.kinetic.stop();
        let (iw, ih) = self.image_dims();
        match &mut self.controller {
            Controller::Sphere(sphere) => {
                let target = sphere.zoom_target(delta);
                let opts = AniOptions {
                    wrap: true,
                    perspective: Some((sphere.perspective, target)),
                    ..Default::default()
                };
                let from = sphere.as_view();
                if self
                    .ani
                    .to_view(&from, from, duration_ms.max(0.0), Bicubic::EASE, now, opts)
                {
                    host.ani_abort(self.id);
                }
            }
            Controller::Flat(cam) => {
                let target = cam.zoom_target(&self.view, &self.viewport, iw, ih, delta, px, py, cfg);
                let opts = AniOptions::default();
                if self
                    .ani
                    .to_view(&self.view, target, duration_ms.max(0.0), Bicubic::EASE, now, opts)
                {
                    host.ani_abort(self.id);
                }
            }
        }
    }

    pub fn pinch_start(&mut self, host: &mut dyn HostHooks) {
        self.kinetic.stop();
        if self.ani.stop() {
            host.ani_abort(self.id);
        }
        if let Controller::Flat(cam) = &mut self.controller {
            cam.pinch_start();
        }
    }

    /// One pinch update from the two-finger centroid and span.
    pub fn pinch(&mut self, cx: f64, cy: f64, span: f64, now: f64, cfg: &Config, host: &mut dyn HostHooks) {
        let step = match &mut self.controller {
            Controller::Flat(cam) => cam.pinch(cx, cy, span),
            Controller::Sphere(_) => None,
        };
        if let Some((dx, dy, dz)) = step {
            self.pan(dx, dy, true, now, cfg, host);
            if dz.abs() > 1e-12 {
                let (iw, ih) = self.image_dims();
                if let Controller::Flat(cam) = &mut self.controller {
                    let target =
                        cam.zoom_target(&self.view, &self.viewport, iw, ih, dz, cx, cy, cfg);
                    self.view = target;
                    cam.set_view(&mut self.view, &self.viewport, iw, ih, cfg);
                }
            }
            host.view_set(self.id);
        }
    }

    /// End the pinch; snap back when the gesture overshot limits.
    pub fn pinch_stop(&mut self, now: f64, cfg: &Config, host: &mut dyn HostHooks) {
        let needs_correction = match &mut self.controller {
            Controller::Flat(cam) => cam.pinch_stop(&self.view, cfg),
            Controller::Sphere(_) => false,
        };
        if needs_correction {
            let (iw, ih) = self.image_dims();
            let mut target = self.view;
            target.apply_limit();
            if let Controller::Flat(cam) = &mut self.controller {
                // Re-run the scale clamp now that pinching is off.
                cam.set_view(&mut target, &self.viewport, iw, ih, cfg);
            }
            let opts = AniOptions {
                correcting: true,
                ..Default::default()
            };
            if self
                .ani
                .to_view(&self.view, target, 250.0, Bicubic::EASE_OUT, now, opts)
            {
                host.ani_abort(self.id);
            }
        }
    }

    // ---- gallery / omni -------------------------------------------------

    /// Switch the active image, crossfading over `duration_ms`.
    pub fn set_active_image(&mut self, index: usize, _duration_ms: f64) {
        if index >= self.images.len() || index == self.active_image {
            return;
        }
        for (i, img) in self.images.iter_mut().enumerate() {
            img.target_opacity = if i == index { 1.0 } else { 0.0 };
        }
        self.active_image = index;
    }

    /// Select the omni ring (vertical viewing angle).
    pub fn set_active_layer(&mut self, ring: u32) {
        if let Some(omni) = self.info.omni {
            self.omni_ring = ring.min(omni.layers.saturating_sub(1));
            self.apply_omni_frame(self.active_image as f64 % omni.frames as f64);
        }
    }

    /// Rotate an omni object to a direction (radians), optionally animated.
    pub fn set_direction(&mut self, direction: f64, duration_ms: f64, now: f64, host: &mut dyn HostHooks) {
        let Some(omni) = self.info.omni else {
            return;
        };
        let frames = omni.frames.max(1) as f64;
        let current = (self.active_image as u32 % omni.frames.max(1)) as f64;
        let target = direction.rem_euclid(TAU) / TAU * frames;
        if duration_ms <= 0.0 {
            self.apply_omni_frame(target);
            return;
        }
        // Shorter way around the ring.
        let delta = (target - current + frames * 0.5).rem_euclid(frames) - frames * 0.5;
        let opts = AniOptions {
            frames: Some((current, current + delta)),
            ..Default::default()
        };
        if self
            .ani
            .to_view(&self.view, self.view, duration_ms, Bicubic::EASE_IN_OUT, now, opts)
        {
            host.ani_abort(self.id);
        }
    }

    fn apply_omni_frame(&mut self, frame: f64) {
        if let Some(omni) = self.info.omni {
            let frames = omni.frames.max(1);
            let wrapped = (frame.floor().rem_euclid(frames as f64)) as u32;
            let index = (self.omni_ring * frames + wrapped) as usize;
            if index < self.images.len() {
                self.set_active_image(index, 0.0);
            }
        }
    }

    /// Fly the view so a focus point sits centered (gallery/omni focus op).
    pub fn set_focus(&mut self, x: f64, y: f64, duration_ms: f64, now: f64, cfg: &Config, host: &mut dyn HostHooks) {
        self.set_coo(x, y, 0.0, duration_ms, now, cfg, host);
    }

    // ---- grid -----------------------------------------------------------

    /// Move this canvas to a new grid cell, animated unless `direct`.
    pub fn set_area(&mut self, area: [f64; 4], direct: bool, now: f64) {
        self.target_area = area;
        if direct {
            self.current_area = area;
            self.area_ani.running = false;
        } else {
            self.area_ani = AreaAni {
                from: self.current_area,
                start: now,
                running: true,
            };
        }
    }

    /// Z-order key: transitioning cells render on top.
    fn z_index(&self) -> u32 {
        u32::from(self.area_ani.running)
    }

    // ---- lifecycle ------------------------------------------------------

    /// Reset to the full view and drop all transient motion.
    pub fn reset(&mut self, cfg: &Config, host: &mut dyn HostHooks) {
        if self.ani.stop() {
            host.ani_abort(self.id);
        }
        self.kinetic.stop();
        self.view = View {
            limit: self.view.limit,
            ..View::default()
        };
        let (iw, ih) = self.image_dims();
        match &mut self.controller {
            Controller::Flat(cam) => cam.set_view(&mut self.view, &self.viewport, iw, ih, cfg),
            Controller::Sphere(sphere) => {
                sphere.set_perspective(1.0);
                sphere.set_direction(0.0, 0.0);
                sphere.update_matrix(&self.viewport);
                self.view = sphere.as_view();
            }
        }
        host.view_set(self.id);
    }

    pub fn stop(&mut self, host: &mut dyn HostHooks) {
        if self.ani.stop() {
            host.ani_abort(self.id);
        }
        self.kinetic.stop();
        for child in &mut self.children {
            child.stop(host);
        }
    }

    pub fn ani_pause(&mut self, now: f64) {
        self.ani.pause(now);
    }

    pub fn ani_resume(&mut self, now: f64) {
        self.ani.resume(now);
    }

    /// Begin a fade toward an opacity target; used for crossfades between
    /// canvases and, with a direction, positional fades between spherical
    /// scenes.
    pub fn fade_to(&mut self, opacity: f64, transition: Option<[f64; 3]>) {
        self.target_opacity = opacity.clamp(0.0, 1.0);
        self.transition = transition;
    }

    // ---- per-frame ------------------------------------------------------

    /// Compute one frame: step animations, fades and tile selection.
    /// Returns whether another frame is needed.
    pub fn should_draw(
        &mut self,
        now: f64,
        dt: f64,
        cfg: &Config,
        host: &mut dyn HostHooks,
        totals: &mut TileStats,
        parent: Option<&Viewport>,
    ) -> bool {
        self.animating = false;

        // 1) Animation controller.
        if let Some(sample) = self.ani.step(now) {
            let (iw, ih) = self.image_dims();
            self.view = sample.view;
            match &mut self.controller {
                Controller::Flat(cam) => {
                    cam.set_view(&mut self.view, &self.viewport, iw, ih, cfg);
                }
                Controller::Sphere(sphere) => {
                    if let Some(p) = sample.perspective {
                        sphere.set_perspective(p);
                    }
                    sphere.apply_view(&self.view);
                    sphere.update_matrix(&self.viewport);
                    self.view = sphere.as_view();
                }
            }
            if let Some(frame) = sample.frame {
                self.apply_omni_frame(frame);
            }
            host.view_set(self.id);
            if sample.done {
                host.ani_done(self.id);
            } else {
                self.animating = true;
            }
        }

        // 2) Kinetic inertia feeds the same pan path as user input.
        if let Some((dx, dy)) = self.kinetic.step(dt, cfg.kinetic_decay) {
            self.pan(dx, dy, true, now, cfg, host);
            self.animating = true;
        }

        // 3) Area transition (grid membership).
        if self.area_ani.running {
            let p = if cfg.area_duration <= 0.0 {
                1.0
            } else {
                ((now - self.area_ani.start) / cfg.area_duration).clamp(0.0, 1.0)
            };
            let eased = Bicubic::EASE_IN_OUT.at(p);
            for i in 0..4 {
                self.current_area[i] =
                    self.area_ani.from[i] + (self.target_area[i] - self.area_ani.from[i]) * eased;
            }
            if p >= 1.0 {
                self.current_area = self.target_area;
                self.area_ani.running = false;
            } else {
                self.animating = true;
            }
            if let Some(parent_vp) = parent {
                let parent_vp = *parent_vp;
                self.resize_from_parent(&parent_vp, cfg, host);
            }
        }

        // 4) Opacity fade (crossfade, or positional fade on spheres).
        if (self.opacity - self.target_opacity).abs() > 1e-9 {
            let rate = dt / cfg.crossfade_duration.max(1.0);
            self.opacity = if self.opacity < self.target_opacity {
                (self.opacity + rate).min(self.target_opacity)
            } else {
                (self.opacity - rate).max(self.target_opacity)
            };
            if let (Some(dir), Controller::Sphere(sphere)) = (self.transition, &mut self.controller)
            {
                let remain = 1.0 - self.opacity;
                sphere.offset = [dir[0] * remain, dir[1] * remain, dir[2] * remain];
                sphere.update_matrix(&self.viewport);
            }
            self.animating = true;
        }
        let visible = self.opacity > 0.0 || self.target_opacity > 0.0;
        if visible != self.visible_notified {
            host.set_visible(self.id, visible);
            self.visible_notified = visible;
        }

        // 5) Per-image fades.
        let embed_rate = dt / cfg.embed_fade_duration.max(1.0);
        for img in &mut self.images {
            if (img.opacity - img.target_opacity).abs() > 1e-9 {
                img.opacity = if img.opacity < img.target_opacity {
                    (img.opacity + embed_rate).min(img.target_opacity)
                } else {
                    (img.opacity - embed_rate).max(img.target_opacity)
                };
                self.animating = true;
            }
        }

        // 6) Tile selection. Runs while anything is visible, and also before
        // the first base tile confirms so the placeholder can ever arrive.
        self.draw_list.clear();
        self.seen.clear();
        let base_pending = self.images.iter().any(|i| i.base_loaded_at.is_none());
        let mut stats = TileStats::default();
        if (visible || base_pending) && self.viewport.is_valid() {
            let scale = self.scale();
            let window = match &self.controller {
                Controller::Sphere(sphere) => Some(sphere.visible_window(&self.viewport)),
                Controller::Flat(_) => None,
            };
            let view = self.view;
            let is_sphere = matches!(self.controller, Controller::Sphere(_));
            for img in &mut self.images {
                if img.opacity <= 0.0 && img.target_opacity <= 0.0 && img.base_loaded_at.is_some() {
                    continue;
                }
                let ctx = if is_sphere && img.info.placement.is_none() {
                    TileContext::Sphere {
                        window: window.unwrap_or_default(),
                        scale,
                    }
                } else {
                    // Flat case (and embeds): rectangular intersection of the
                    // image's occupied area with the visible view window.
                    let [ax0, ay0, ax1, ay1] = img.info.area;
                    let visible_rect = view.intersect(ax0, ay0, ax1, ay1).map(|[x0, y0, x1, y1]| {
                        let w = (ax1 - ax0).max(1e-9);
                        let h = (ay1 - ay0).max(1e-9);
                        [(x0 - ax0) / w, (y0 - ay0) / h, (x1 - ax0) / w, (y1 - ay0) / h]
                    });
                    TileContext::Flat {
                        visible: visible_rect,
                        scale,
                    }
                };
                let s = img.get_tiles(&ctx, host, &mut self.seen, &mut self.draw_list);
                stats.requested += s.requested;
                stats.loaded += s.loaded;
            }
            // Coarse layers first so finer tiles paint over them.
            self.draw_list.sort();
        }
        totals.requested += stats.requested;
        totals.loaded += stats.loaded;

        // 7) Children (grid cells).
        let parent_vp = self.viewport;
        let mut child_needs = false;
        for child in &mut self.children {
            child_needs |= child.should_draw(now, dt, cfg, host, totals, Some(&parent_vp));
        }
        self.children.sort_by_key(|c| c.z_index());

        self.animating
            || child_needs
            || stats.loaded < stats.requested
            || base_pending
            || self.kinetic.is_coasting()
    }

    /// Emit this frame's draw calls. Purely presentational: all state was
    /// computed by `should_draw`.
    pub fn draw(&mut self, now: f64, host: &mut dyn HostHooks) {
        if !self.draw_list.is_empty() {
            let [vx, vy, vw, vh] = self.viewport.area.unwrap_or([
                self.viewport.left,
                self.viewport.top,
                self.viewport.width,
                self.viewport.height,
            ]);
            host.set_viewport(vx, vy, vw, vh);
            if let Controller::Sphere(sphere) = &self.controller {
                host.set_matrix(&sphere.projection().to_array());
            }
            if self.info.gallery {
                host.draw_quad(self.opacity);
            }

            for i in 0..self.draw_list.len() {
                let rect = self.draw_list[i];
                let Some(img_pos) = self.images.iter().position(|im| im.id == rect.image) else {
                    continue;
                };
                let image_opacity = self.images[img_pos].opacity * self.opacity;
                let opacity =
                    host.set_tile_opacity(rect.tile, !rect.target_layer, image_opacity);
                let drawn = host.draw_tile(
                    rect.image,
                    rect.tile,
                    rect.layer,
                    rect.col,
                    rect.row,
                    opacity,
                    self.animating,
                    rect.target_layer,
                );
                if drawn
                    && rect.tile == self.images[img_pos].base_tile()
                    && self.images[img_pos].mark_base_drawn(now)
                {
                    host.set_image_visible(self.images[img_pos].id, true);
                    // First confirmed base tile of a still-hidden canvas
                    // starts its fade-in.
                    if self.opacity == 0.0 && self.target_opacity == 0.0 {
                        self.target_opacity = 1.0;
                    }
                }
            }
        }

        for child in &mut self.children {
            child.draw(now, host);
        }
    }

    /// Current effective scale for the active camera mode.
    pub fn scale(&self) -> f64 {
        match &self.controller {
            Controller::Flat(cam) => cam.scale,
            Controller::Sphere(sphere) => {
                let (iw, _) = self.image_dims();
                sphere.scale(&self.viewport, iw)
            }
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animating || self.ani.is_running() || self.kinetic.is_coasting()
    }

    /// Find a canvas (self or descendant) by id.
    pub fn find_mut(&mut self, id: CanvasId) -> Option<&mut Canvas> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn find(&self, id: CanvasId) -> Option<&Canvas> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}
