use js_sys::{Array, Float64Array, Function, Reflect};
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use vantage_view_core::{
    CanvasId, CanvasInfo, Config, Engine, HostHooks, ImageId, TileIndex,
};

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

/// Host hooks backed by a JS callback object. Missing callbacks are treated
/// as no-ops; the two tile-opacity hooks are required because tile selection
/// depends on their answers.
struct JsHost {
    draw_tile: Function,
    get_tile_opacity: Function,
    set_tile_opacity: Function,
    draw_quad: Option<Function>,
    set_matrix: Option<Function>,
    set_viewport: Option<Function>,
    view_set: Option<Function>,
    viewport_set: Option<Function>,
    set_visible: Option<Function>,
    set_image_visible: Option<Function>,
    ani_done: Option<Function>,
    ani_abort: Option<Function>,
}

fn get_fn(obj: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(obj, &JsValue::from_str(name))
        .ok()
        .and_then(|v| v.dyn_into::<Function>().ok())
}

fn require_fn(obj: &JsValue, name: &str) -> Result<Function, JsError> {
    get_fn(obj, name).ok_or_else(|| JsError::new(&format!("callbacks.{name} must be a function")))
}

impl JsHost {
    fn from_object(obj: &JsValue) -> Result<Self, JsError> {
        Ok(Self {
            draw_tile: require_fn(obj, "drawTile")?,
            get_tile_opacity: require_fn(obj, "getTileOpacity")?,
            set_tile_opacity: require_fn(obj, "setTileOpacity")?,
            draw_quad: get_fn(obj, "drawQuad"),
            set_matrix: get_fn(obj, "setMatrix"),
            set_viewport: get_fn(obj, "setViewport"),
            view_set: get_fn(obj, "viewSet"),
            viewport_set: get_fn(obj, "viewportSet"),
            set_visible: get_fn(obj, "setVisible"),
            set_image_visible: get_fn(obj, "setVisible2"),
            ani_done: get_fn(obj, "aniDone"),
            ani_abort: get_fn(obj, "aniAbort"),
        })
    }
}

impl HostHooks for JsHost {
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
    ) -> bool {
        let args = Array::new();
        args.push(&JsValue::from_f64(f64::from(image.0)));
        args.push(&JsValue::from_f64(f64::from(tile.0)));
        args.push(&JsValue::from_f64(f64::from(layer)));
        args.push(&JsValue::from_f64(f64::from(col)));
        args.push(&JsValue::from_f64(f64::from(row)));
        args.push(&JsValue::from_f64(opacity));
        args.push(&JsValue::from_bool(animating));
        args.push(&JsValue::from_bool(target_layer));
        self.draw_tile
            .apply(&JsValue::UNDEFINED, &args)
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn draw_quad(&mut self, opacity: f64) {
        if let Some(f) = &self.draw_quad {
            let _ = f.call1(&JsValue::UNDEFINED, &JsValue::from_f64(opacity));
        }
    }

    fn tile_opacity(&mut self, tile: TileIndex) -> f64 {
        self.get_tile_opacity
            .call1(&JsValue::UNDEFINED, &JsValue::from_f64(f64::from(tile.0)))
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn set_tile_opacity(&mut self, tile: TileIndex, force_full: bool, image_opacity: f64) -> f64 {
        self.set_tile_opacity
            .call3(
                &JsValue::UNDEFINED,
                &JsValue::from_f64(f64::from(tile.0)),
                &JsValue::from_bool(force_full),
                &JsValue::from_f64(image_opacity),
            )
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(image_opacity)
    }

    fn set_matrix(&mut self, matrix: &[f64; 16]) {
        if let Some(f) = &self.set_matrix {
            let buf = Float64Array::from(matrix.as_slice());
            let _ = f.call1(&JsValue::UNDEFINED, &buf);
        }
    }

    fn set_viewport(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if let Some(f) = &self.set_viewport {
            let args = Array::of4(
                &JsValue::from_f64(x),
                &JsValue::from_f64(y),
                &JsValue::from_f64(w),
                &JsValue::from_f64(h),
            );
            let _ = f.apply(&JsValue::UNDEFINED, &args);
        }
    }

    fn view_set(&mut self, canvas: CanvasId) {
        if let Some(f) = &self.view_set {
            let _ = f.call1(&JsValue::UNDEFINED, &JsValue::from_f64(f64::from(canvas.0)));
        }
    }

    fn viewport_set(&mut self, canvas: CanvasId, x: f64, y: f64, w: f64, h: f64) {
        if let Some(f) = &self.viewport_set {
            let args = Array::of5(
                &JsValue::from_f64(f64::from(canvas.0)),
                &JsValue::from_f64(x),
                &JsValue::from_f64(y),
                &JsValue::from_f64(w),
                &JsValue::from_f64(h),
            );
            let _ = f.apply(&JsValue::UNDEFINED, &args);
        }
    }

    fn set_visible(&mut self, canvas: CanvasId, visible: bool) {
        if let Some(f) = &self.set_visible {
            let _ = f.call2(
                &JsValue::UNDEFINED,
                &JsValue::from_f64(f64::from(canvas.0)),
                &JsValue::from_bool(visible),
            );
        }
    }

    fn set_image_visible(&mut self, image: ImageId, visible: bool) {
        if let Some(f) = &self.set_image_visible {
            let _ = f.call2(
                &JsValue::UNDEFINED,
                &JsValue::from_f64(f64::from(image.0)),
                &JsValue::from_bool(visible),
            );
        }
    }

    fn ani_done(&mut self, canvas: CanvasId) {
        if let Some(f) = &self.ani_done {
            let _ = f.call1(&JsValue::UNDEFINED, &JsValue::from_f64(f64::from(canvas.0)));
        }
    }

    fn ani_abort(&mut self, canvas: CanvasId) {
        if let Some(f) = &self.ani_abort {
            let _ = f.call1(&JsValue::UNDEFINED, &JsValue::from_f64(f64::from(canvas.0)));
        }
    }
}

/// Bumped when the exported API surface changes incompatibly.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}

#[wasm_bindgen]
pub struct VantageView {
    core: Engine,
}

#[wasm_bindgen]
impl VantageView {
    /// Create a new engine. `config` is a JSON config object (or undefined
    /// for defaults); `callbacks` carries the host hook functions.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, callbacks: JsValue) -> Result<VantageView, JsError> {
        console_error_panic_hook::set_once();

        let cfg: Config = if jsvalue_is_undefined_or_null(&config) {
            Config::default()
        } else {
            swb::from_value(config).map_err(|e| JsError::new(&format!("config error: {e}")))?
        };
        let host = JsHost::from_object(&callbacks)?;

        Ok(VantageView {
            core: Engine::new(cfg, Box::new(host)),
        })
    }

    /// Create a canvas from a JSON descriptor. Returns a CanvasId (u32).
    #[wasm_bindgen(js_name = addCanvas)]
    pub fn add_canvas(&mut self, info: JsValue) -> Result<u32, JsError> {
        let info: CanvasInfo = swb::from_value(info)
            .map_err(|e| JsError::new(&format!("canvas descriptor error: {e}")))?;
        let id = self
            .core
            .add_canvas(info)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(id.0)
    }

    #[wasm_bindgen(js_name = addChildCanvas)]
    pub fn add_child_canvas(&mut self, parent: u32, info: JsValue) -> Result<u32, JsError> {
        let info: CanvasInfo = swb::from_value(info)
            .map_err(|e| JsError::new(&format!("canvas descriptor error: {e}")))?;
        let id = self
            .core
            .add_child_canvas(CanvasId(parent), info)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(id.0)
    }

    #[wasm_bindgen(js_name = removeCanvas)]
    pub fn remove_canvas(&mut self, canvas: u32) -> bool {
        self.core.remove_canvas(CanvasId(canvas))
    }

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
        self.core.resize(width, height, left, top, ratio, scale, portrait);
    }

    /// Per-frame entry: compute the frame at `now` (ms). Returns whether
    /// another frame is needed.
    #[wasm_bindgen(js_name = shouldDraw)]
    pub fn should_draw(&mut self, now: f64) -> bool {
        self.core.should_draw(now)
    }

    pub fn draw(&mut self) {
        self.core.draw();
    }

    pub fn progress(&self) -> f64 {
        self.core.progress()
    }

    pub fn stop(&mut self) {
        self.core.stop();
    }

    pub fn reset(&mut self, canvas: u32) {
        self.core.reset(CanvasId(canvas));
    }

    #[wasm_bindgen(js_name = setView)]
    pub fn set_view(&mut self, canvas: u32, x0: f64, y0: f64, x1: f64, y1: f64) {
        self.core.set_view(CanvasId(canvas), x0, y0, x1, y1);
    }

    #[wasm_bindgen(js_name = setView360)]
    pub fn set_view_360(&mut self, canvas: u32, yaw: f64, pitch: f64, perspective: f64) {
        self.core.set_view_360(CanvasId(canvas), yaw, pitch, perspective);
    }

    #[wasm_bindgen(js_name = setLimit)]
    pub fn set_limit(&mut self, canvas: u32, x0: f64, y0: f64, x1: f64, y1: f64) {
        self.core.set_limit(CanvasId(canvas), [x0, y0, x1, y1]);
    }

    #[wasm_bindgen(js_name = flyTo)]
    pub fn fly_to(
        &mut self,
        canvas: u32,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        duration: f64,
        jump: bool,
    ) {
        self.core
            .fly_to(CanvasId(canvas), [x0, y0, x1, y1], duration, jump);
    }

    #[wasm_bindgen(js_name = setCoo)]
    pub fn set_coo(&mut self, canvas: u32, x: f64, y: f64, scale: f64, duration: f64) {
        self.core.set_coo(CanvasId(canvas), x, y, scale, duration);
    }

    pub fn pan(&mut self, canvas: u32, dx: f64, dy: f64) {
        self.core.pan(CanvasId(canvas), dx, dy);
    }

    #[wasm_bindgen(js_name = panRelease)]
    pub fn pan_release(&mut self, canvas: u32) {
        self.core.pan_release(CanvasId(canvas));
    }

    pub fn zoom(&mut self, canvas: u32, delta: f64, px: f64, py: f64, duration: f64) {
        self.core.zoom(CanvasId(canvas), delta, px, py, duration);
    }

    #[wasm_bindgen(js_name = pinchStart)]
    pub fn pinch_start(&mut self, canvas: u32) {
        self.core.pinch_start(CanvasId(canvas));
    }

    pub fn pinch(&mut self, canvas: u32, cx: f64, cy: f64, span: f64) {
        self.core.pinch(CanvasId(canvas), cx, cy, span);
    }

    #[wasm_bindgen(js_name = pinchStop)]
    pub fn pinch_stop(&mut self, canvas: u32) {
        self.core.pinch_stop(CanvasId(canvas));
    }

    #[wasm_bindgen(js_name = setDirection)]
    pub fn set_direction(&mut self, canvas: u32, direction: f64, duration: f64) {
        self.core.set_direction(CanvasId(canvas), direction, duration);
    }

    #[wasm_bindgen(js_name = setArea)]
    pub fn set_area(&mut self, canvas: u32, x0: f64, y0: f64, x1: f64, y1: f64, direct: bool) {
        self.core.set_area(CanvasId(canvas), [x0, y0, x1, y1], direct);
    }

    /// Constrain rendering to a pixel rectangle until the next resize.
    #[wasm_bindgen(js_name = setRenderArea)]
    pub fn set_render_area(&mut self, canvas: u32, x: f64, y: f64, w: f64, h: f64) {
        self.core
            .set_render_area(CanvasId(canvas), Some([x, y, w, h]));
    }

    #[wasm_bindgen(js_name = clearRenderArea)]
    pub fn clear_render_area(&mut self, canvas: u32) {
        self.core.set_render_area(CanvasId(canvas), None);
    }

    #[wasm_bindgen(js_name = setActiveImage)]
    pub fn set_active_image(&mut self, canvas: u32, index: u32, duration: f64) {
        self.core
            .set_active_image(CanvasId(canvas), index as usize, duration);
    }

    #[wasm_bindgen(js_name = setActiveLayer)]
    pub fn set_active_layer(&mut self, canvas: u32, ring: u32) {
        self.core.set_active_layer(CanvasId(canvas), ring);
    }

    #[wasm_bindgen(js_name = setFocus)]
    pub fn set_focus(&mut self, canvas: u32, x: f64, y: f64, duration: f64) {
        self.core.set_focus(CanvasId(canvas), x, y, duration);
    }

    #[wasm_bindgen(js_name = fadeTo)]
    pub fn fade_to(&mut self, canvas: u32, opacity: f64) {
        self.core.fade_to(CanvasId(canvas), opacity, None);
    }

    #[wasm_bindgen(js_name = aniPause)]
    pub fn ani_pause(&mut self, canvas: u32) {
        self.core.ani_pause(CanvasId(canvas));
    }

    #[wasm_bindgen(js_name = aniResume)]
    pub fn ani_resume(&mut self, canvas: u32) {
        self.core.ani_resume(CanvasId(canvas));
    }

    #[wasm_bindgen(js_name = aniStop)]
    pub fn ani_stop(&mut self, canvas: u32) {
        self.core.ani_stop(CanvasId(canvas));
    }

    /// View corners as a flat `[x0, y0, x1, y1]` buffer.
    #[wasm_bindgen(js_name = getView)]
    pub fn get_view(&self, canvas: u32) -> Option<Float64Array> {
        self.core
            .get_view(CanvasId(canvas))
            .map(|rect| Float64Array::from(rect.as_slice()))
    }

    /// Screen px → image coordinates as `[x, y, scale, depth, direction]`.
    #[wasm_bindgen(js_name = getCoo)]
    pub fn get_coo(&self, canvas: u32, px: f64, py: f64) -> Option<Float64Array> {
        self.core
            .get_coo(CanvasId(canvas), px, py)
            .map(|coo| Float64Array::from(coo.to_array().as_slice()))
    }

    /// Image coordinates → screen px as `[x, y, scale, depth, direction]`.
    #[wasm_bindgen(js_name = getXY)]
    pub fn get_xy(&self, canvas: u32, x: f64, y: f64) -> Option<Float64Array> {
        self.core
            .get_xy(CanvasId(canvas), x, y)
            .map(|coo| Float64Array::from(coo.to_array().as_slice()))
    }

    #[wasm_bindgen(js_name = isAnimating)]
    pub fn is_animating(&self, canvas: u32) -> bool {
        self.core.is_animating(CanvasId(canvas)).unwrap_or(false)
    }

    /// Placement matrix for an embed on a spherical canvas (16 elements,
    /// column-major). Undefined for flat canvases.
    #[wasm_bindgen(js_name = getMatrix)]
    #[allow(clippy::too_many_arguments)]
    pub fn get_matrix(
        &self,
        canvas: u32,
        x: f64,
        y: f64,
        rot_x: f64,
        rot_y: f64,
        rot_z: f64,
        scale: f64,
        radius: f64,
    ) -> Option<Float64Array> {
        self.core
            .get_matrix(CanvasId(canvas), x, y, [rot_x, rot_y, rot_z], scale, radius)
            .map(|m| Float64Array::from(m.as_slice()))
    }

    pub fn scale(&self, canvas: u32) -> f64 {
        self.core.scale(CanvasId(canvas)).unwrap_or(0.0)
    }
}
