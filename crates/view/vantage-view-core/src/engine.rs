//! Engine: top-level registry of canvases and the per-frame entry points.
//!
//! Owns the shared per-frame globals (now, frame delta, config) and the host
//! callback object. All mutation happens synchronously inside a call from the
//! host; the engine schedules nothing itself.

use log::debug;

use crate::canvas::{Canvas, CanvasInfo, Controller};
use crate::config::Config;
use crate::error::EngineError;
use crate::host::HostHooks;
use crate::ids::{CanvasId, IdAllocator};
use crate::image::TileStats;
use crate::view::{Coordinates, View};

pub struct Engine {
    cfg: Config,
    ids: IdAllocator,
    host: Box<dyn HostHooks>,
    canvases: Vec<Canvas>,

    /// Shared per-frame globals: written once at the top of `should_draw`,
    /// read-only for the rest of the frame.
    now: f64,
    frame_dt: f64,
    progress: f64,
}

fn find_canvas(canvases: &mut [Canvas], id: CanvasId) -> Option<&mut Canvas> {
    canvases.iter_mut().find_map(|c| c.find_mut(id))
}

impl Engine {
    pub fn new(cfg: Config, host: Box<dyn HostHooks>) -> Self {
        Self {
            cfg,
            ids: IdAllocator::new(),
            host,
            canvases: Vec::new(),
            now: 0.0,
            frame_dt: 0.0,
            progress: 1.0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    // ---- lifecycle ------------------------------------------------------

    /// Create a root canvas from its static descriptor.
    pub fn add_canvas(&mut self, info: CanvasInfo) -> Result<CanvasId, EngineError> {
        let id = self.ids.alloc_canvas();
        let canvas = Canvas::new(id, info, &self.cfg, &mut self.ids)?;
        self.canvases.push(canvas);
        Ok(id)
    }

    /// Create a child canvas inside a parent (grid cell).
    pub fn add_child_canvas(
        &mut self,
        parent: CanvasId,
        info: CanvasInfo,
    ) -> Result<CanvasId, EngineError> {
        let id = self.ids.alloc_canvas();
        let child = Canvas::new(id, info, &self.cfg, &mut self.ids)?;
        let Some(parent_canvas) = find_canvas(&mut self.canvases, parent) else {
            return Err(EngineError::UnknownCanvas(parent));
        };
        parent_canvas.children.push(child);
        Ok(id)
    }

    /// Destroy a canvas (and its children). Returns whether it existed.
    pub fn remove_canvas(&mut self, id: CanvasId) -> bool {
        fn remove_in(list: &mut Vec<Canvas>, id: CanvasId) -> bool {
            if let Some(pos) = list.iter().position(|c| c.id == id) {
                list.remove(pos);
                return true;
            }
            list.iter_mut().any(|c| remove_in(&mut c.children, id))
        }
        let removed = remove_in(&mut self.canvases, id);
        if removed {
            debug!("canvas {:?} removed", id);
        }
        removed
    }

    // ---- broadcast operations -------------------------------------------

    /// Apply a new screen geometry to every root canvas; children derive
    /// theirs from their grid areas.
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
    ) {
        debug!("resize {width}x{height}+{left}+{top} @{ratio}");
        for canvas in &mut self.canvases {
            canvas.resize(
                width,
                height,
                left,
                top,
                ratio,
                scale,
                portrait,
                &self.cfg,
                self.host.as_mut(),
            );
        }
    }

    /// Abort every animation and kinetic motion.
    pub fn stop(&mut self) {
        for canvas in &mut self.canvases {
            canvas.stop(self.host.as_mut());
        }
    }

    pub fn reset(&mut self, id: CanvasId) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.reset(&self.cfg, self.host.as_mut());
        }
    }

    // ---- per-frame ------------------------------------------------------

    /// Advance the engine to `now` (ms). Returns whether another frame is
    /// needed after this one.
    pub fn should_draw(&mut self, now: f64) -> bool {
        self.frame_dt = if self.now > 0.0 { (now - self.now).max(0.0) } else { 0.0 };
        self.now = now;

        let mut totals = TileStats::default();
        let mut needed = false;
        for canvas in &mut self.canvases {
            needed |= canvas.should_draw(
                now,
                self.frame_dt,
                &self.cfg,
                self.host.as_mut(),
                &mut totals,
                None,
            );
        }
        self.progress = if totals.requested == 0 {
            1.0
        } else {
            f64::from(totals.loaded) / f64::from(totals.requested)
        };
        needed
    }

    /// Emit this frame's draw callbacks.
    pub fn draw(&mut self) {
        for canvas in &mut self.canvases {
            canvas.draw(self.now, self.host.as_mut());
        }
    }

    /// Loaded/requested tile ratio for the last computed frame.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    // ---- navigation forwarding ------------------------------------------

    pub fn set_view(&mut self, id: CanvasId, x0: f64, y0: f64, x1: f64, y1: f64) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_view(x0, y0, x1, y1, &self.cfg, self.host.as_mut());
        }
    }

    pub fn set_view_360(&mut self, id: CanvasId, yaw: f64, pitch: f64, perspective: f64) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_view_360(yaw, pitch, perspective, self.host.as_mut());
        }
    }

    pub fn set_limit(&mut self, id: CanvasId, limit: [f64; 4]) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.view.limit = limit;
        }
    }

    pub fn fly_to(&mut self, id: CanvasId, target: [f64; 4], duration_ms: f64, jump: bool) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            let mut view = view_from_corners(target);
            view.limit = c.view.limit;
            c.fly_to(view, duration_ms, jump, now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn set_coo(&mut self, id: CanvasId, x: f64, y: f64, scale: f64, duration_ms: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_coo(x, y, scale, duration_ms, now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn pan(&mut self, id: CanvasId, dx: f64, dy: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.pan(dx, dy, false, now, &self.cfg, self.host.as_mut());
        }
    }

    /// End a drag gesture, releasing accumulated momentum.
    pub fn pan_release(&mut self, id: CanvasId) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.pan_stop(now);
        }
    }

    pub fn zoom(&mut self, id: CanvasId, delta: f64, px: f64, py: f64, duration_ms: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.zoom(delta, px, py, duration_ms, now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn pinch_start(&mut self, id: CanvasId) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.pinch_start(self.host.as_mut());
        }
    }

    pub fn pinch(&mut self, id: CanvasId, cx: f64, cy: f64, span: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.pinch(cx, cy, span, now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn pinch_stop(&mut self, id: CanvasId) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.pinch_stop(now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn set_direction(&mut self, id: CanvasId, direction: f64, duration_ms: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_direction(direction, duration_ms, now, self.host.as_mut());
        }
    }

    pub fn set_area(&mut self, id: CanvasId, area: [f64; 4], direct: bool) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_area(area, direct, now);
        }
    }

    /// Temporary pixel constraint for partial-screen renders, cleared by the
    /// next full resize.
    pub fn set_render_area(&mut self, id: CanvasId, area: Option<[f64; 4]>) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.viewport.area = area;
        }
    }

    pub fn set_active_image(&mut self, id: CanvasId, index: usize, duration_ms: f64) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_active_image(index, duration_ms);
        }
    }

    pub fn set_active_layer(&mut self, id: CanvasId, ring: u32) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_active_layer(ring);
        }
    }

    pub fn set_focus(&mut self, id: CanvasId, x: f64, y: f64, duration_ms: f64) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.set_focus(x, y, duration_ms, now, &self.cfg, self.host.as_mut());
        }
    }

    pub fn fade_to(&mut self, id: CanvasId, opacity: f64, transition: Option<[f64; 3]>) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.fade_to(opacity, transition);
        }
    }

    pub fn ani_pause(&mut self, id: CanvasId) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.ani_pause(now);
        }
    }

    pub fn ani_resume(&mut self, id: CanvasId) {
        let now = self.now;
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            c.ani_resume(now);
        }
    }

    pub fn ani_stop(&mut self, id: CanvasId) {
        if let Some(c) = find_canvas(&mut self.canvases, id) {
            if c.ani.stop() {
                let cid = c.id;
                self.host.ani_abort(cid);
            }
        }
    }

    // ---- queries --------------------------------------------------------

    pub fn get_view(&self, id: CanvasId) -> Option<[f64; 4]> {
        self.find(id).map(|c| c.view.to_array())
    }

    pub fn get_coo(&self, id: CanvasId, px: f64, py: f64) -> Option<Coordinates> {
        self.find(id).map(|c| c.get_coo(px, py))
    }

    pub fn get_xy(&self, id: CanvasId, x: f64, y: f64) -> Option<Coordinates> {
        self.find(id).map(|c| c.get_xy(x, y))
    }

    pub fn is_animating(&self, id: CanvasId) -> Option<bool> {
        self.find(id).map(|c| c.is_animating())
    }

    /// Placement matrix for an embed on a spherical canvas, as a flat
    /// 16-element buffer. `None` for flat canvases.
    pub fn get_matrix(
        &self,
        id: CanvasId,
        x: f64,
        y: f64,
        rotation: [f64; 3],
        scale: f64,
        radius: f64,
    ) -> Option<[f64; 16]> {
        self.find(id).and_then(|c| match &c.controller {
            Controller::Sphere(s) => Some(s.get_matrix(x, y, rotation, scale, radius).to_array()),
            Controller::Flat(_) => None,
        })
    }

    pub fn scale(&self, id: CanvasId) -> Option<f64> {
        self.find(id).map(|c| c.scale())
    }

    /// Direct canvas access for hosts embedded in the same process.
    pub fn canvas(&self, id: CanvasId) -> Option<&Canvas> {
        self.find(id)
    }

    pub fn canvas_mut(&mut self, id: CanvasId) -> Option<&mut Canvas> {
        find_canvas(&mut self.canvases, id)
    }

    fn find(&self, id: CanvasId) -> Option<&Canvas> {
        self.canvases.iter().find_map(|c| c.find(id))
    }
}

/// Convenience for building a target view from a corner buffer.
pub fn view_from_corners(rect: [f64; 4]) -> View {
    let mut v = View::default();
    v.set_corners(rect[0], rect[1], rect[2], rect[3]);
    v
}
