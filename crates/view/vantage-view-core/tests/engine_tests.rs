use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use approx::assert_relative_eq;
use vantage_view_core::{
    canvas::{CanvasInfo, Controller},
    config::Config,
    engine::Engine,
    host::HostHooks,
    ids::{CanvasId, ImageId, TileIndex},
    image::ImageInfo,
};

fn approx(a: f64, b: f64, eps: f64) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// Shared recording state the tests inspect after driving the engine.
#[derive(Default)]
struct HostState {
    drawn: Vec<(TileIndex, bool)>,
    opacities: HashMap<u32, f64>,
    default_opacity: f64,
    done: Vec<CanvasId>,
    aborted: Vec<CanvasId>,
    views_set: usize,
    visible: Vec<(CanvasId, bool)>,
}

struct TestHost(Rc<RefCell<HostState>>);

impl HostHooks for TestHost {
    fn draw_tile(
        &mut self,
        _image: ImageId,
        tile: TileIndex,
        _layer: u32,
        _col: u32,
        _row: u32,
        _opacity: f64,
        _animating: bool,
        target_layer: bool,
    ) -> bool {
        self.0.borrow_mut().drawn.push((tile, target_layer));
        true
    }

    fn tile_opacity(&mut self, tile: TileIndex) -> f64 {
        let s = self.0.borrow();
        *s.opacities.get(&tile.0).unwrap_or(&s.default_opacity)
    }

    fn set_tile_opacity(&mut self, tile: TileIndex, _force_full: bool, image_opacity: f64) -> f64 {
        self.tile_opacity(tile) * image_opacity
    }

    fn view_set(&mut self, _canvas: CanvasId) {
        self.0.borrow_mut().views_set += 1;
    }

    fn set_visible(&mut self, canvas: CanvasId, visible: bool) {
        self.0.borrow_mut().visible.push((canvas, visible));
    }

    fn ani_done(&mut self, canvas: CanvasId) {
        self.0.borrow_mut().done.push(canvas);
    }

    fn ani_abort(&mut self, canvas: CanvasId) {
        self.0.borrow_mut().aborted.push(canvas);
    }
}

fn mk_engine(state: &Rc<RefCell<HostState>>, cfg: Config) -> Engine {
    state.borrow_mut().default_opacity = 1.0;
    Engine::new(cfg, Box::new(TestHost(state.clone())))
}

fn flat_info(width: f64, height: f64) -> CanvasInfo {
    CanvasInfo {
        images: vec![ImageInfo {
            width,
            height,
            tile_size: 1024,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// it should fly a 2000x1000 source in a 500x500 viewport to a centered
/// close-up, with exact progress and view values at start, midpoint and end
#[test]
fn end_to_end_fly_to_scenario() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(
        &state,
        Config {
            max_scale: 2.0,
            ..Default::default()
        },
    );
    let id = eng.add_canvas(flat_info(2000.0, 1000.0)).unwrap();
    eng.resize(500.0, 500.0, 0.0, 0.0, 1.0, 1.0, false);

    // fullScale = min(500/2000, 500/1000) = 0.25.
    {
        let canvas = eng.canvas(id).unwrap();
        match &canvas.controller {
            Controller::Flat(cam) => assert_relative_eq!(cam.full_scale, 0.25),
            Controller::Sphere(_) => panic!("expected flat canvas"),
        }
        // The initial view is the full image, aspect-expanded vertically.
        assert_relative_eq!(canvas.view.width, 1.0);
        assert_relative_eq!(canvas.view.height, 2.0);
    }

    let start = 1000.0;
    eng.should_draw(start);
    eng.fly_to(id, [0.4, 0.4, 0.6, 0.6], 1000.0, false);

    eng.should_draw(start);
    {
        let canvas = eng.canvas(id).unwrap();
        approx(canvas.ani.progress(), 0.0, 1e-12);
    }

    eng.should_draw(start + 500.0);
    {
        let canvas = eng.canvas(id).unwrap();
        approx(canvas.ani.progress(), 0.5, 1e-12);
        // Strictly between source and target on both size axes.
        assert!(canvas.view.width < 1.0 && canvas.view.width > 0.2);
        assert!(canvas.view.height < 2.0 && canvas.view.height > 0.4);
        approx(canvas.view.center_x, 0.5, 1e-9);
        approx(canvas.view.center_y, 0.5, 1e-9);
    }

    eng.should_draw(start + 1000.0);
    {
        let canvas = eng.canvas(id).unwrap();
        approx(canvas.ani.progress(), 1.0, 1e-12);
        // Exactly the normalized target: 0.2 wide, aspect-expanded to 0.4.
        approx(canvas.view.width, 0.2, 1e-9);
        approx(canvas.view.height, 0.4, 1e-9);
        approx(canvas.view.center_x, 0.5, 1e-9);
        approx(canvas.view.center_y, 0.5, 1e-9);
        assert!(!canvas.ani.is_running());
    }

    // Exactly one completion, no abort.
    assert_eq!(state.borrow().done.len(), 1);
    assert_eq!(state.borrow().aborted.len(), 0);

    // Stepping further fires nothing else.
    eng.should_draw(start + 1100.0);
    assert_eq!(state.borrow().done.len(), 1);
}

/// it should abort a superseded animation and complete the replacement
#[test]
fn superseded_animation_aborts_once() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(2000.0, 2000.0)).unwrap();
    eng.resize(500.0, 500.0, 0.0, 0.0, 1.0, 1.0, false);

    eng.should_draw(100.0);
    eng.fly_to(id, [0.4, 0.4, 0.6, 0.6], 1000.0, false);
    eng.should_draw(200.0);
    eng.fly_to(id, [0.0, 0.0, 0.5, 0.5], 1000.0, false);
    eng.should_draw(1300.0);

    let s = state.borrow();
    assert_eq!(s.aborted.len(), 1, "first animation aborted");
    assert_eq!(s.done.len(), 1, "second animation completed");
}

/// it should stop a running animation via ani_stop with an abort, not done
#[test]
fn ani_stop_fires_abort_only() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(2000.0, 2000.0)).unwrap();
    eng.resize(500.0, 500.0, 0.0, 0.0, 1.0, 1.0, false);

    eng.should_draw(100.0);
    eng.fly_to(id, [0.4, 0.4, 0.6, 0.6], 1000.0, false);
    eng.should_draw(300.0);
    eng.ani_stop(id);
    eng.should_draw(2000.0);

    let s = state.borrow();
    assert_eq!(s.aborted.len(), 1);
    assert_eq!(s.done.len(), 0);
}

/// it should keep the scale within bounds through arbitrary pan/zoom input
#[test]
fn scale_bounds_hold_after_input_storm() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(4000.0, 3000.0)).unwrap();
    eng.resize(800.0, 600.0, 0.0, 0.0, 1.0, 1.0, false);
    eng.should_draw(10.0);

    let mut t = 10.0;
    for i in 0..50 {
        t += 16.0;
        eng.pan(id, (i as f64 - 25.0) * 40.0, 17.0);
        eng.zoom(id, if i % 2 == 0 { -3.0 } else { 3.5 }, 100.0, 100.0, 0.0);
        eng.should_draw(t);
    }

    let canvas = eng.canvas(id).unwrap();
    match &canvas.controller {
        Controller::Flat(cam) => {
            let cfg = eng.config();
            assert!(cam.scale <= cam.max_scale + 1e-9);
            assert!(cam.scale >= cam.min_scale * cfg.min_size - 1e-9);
        }
        Controller::Sphere(_) => panic!(),
    }
}

/// it should request tiles covering the visible view, base included
#[test]
fn tile_selection_covers_view() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(4096.0, 4096.0)).unwrap();
    eng.resize(1024.0, 1024.0, 0.0, 0.0, 1.0, 1.0, false);
    eng.should_draw(16.0);
    eng.draw();

    let s = state.borrow();
    assert!(!s.drawn.is_empty());
    // The base (coarsest) tile is present among the drawn tiles.
    let base = eng.canvas(id).unwrap().images[0].base_tile();
    assert!(s.drawn.iter().any(|(t, _)| *t == base));
}

/// it should report load progress below 1 while tiles are missing
#[test]
fn progress_tracks_missing_tiles() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    state.borrow_mut().default_opacity = 0.0;
    let _id = eng.add_canvas(flat_info(4096.0, 4096.0)).unwrap();
    eng.resize(1024.0, 1024.0, 0.0, 0.0, 1.0, 1.0, false);

    let needs_more = eng.should_draw(16.0);
    assert!(needs_more, "missing tiles keep the frame loop running");
    assert!(eng.progress() < 1.0);

    // Everything arrives; the next frame reports complete.
    state.borrow_mut().default_opacity = 1.0;
    eng.should_draw(32.0);
    approx(eng.progress(), 1.0, 1e-12);
}

/// it should fade the canvas in only after its base tile confirms
#[test]
fn base_tile_triggers_fade_in() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(2048.0, 2048.0)).unwrap();
    eng.resize(512.0, 512.0, 0.0, 0.0, 1.0, 1.0, false);

    eng.should_draw(16.0);
    assert_eq!(eng.canvas(id).unwrap().opacity, 0.0);
    eng.draw();

    // Base confirmed during draw; fades over the next frames.
    eng.should_draw(32.0);
    let after_first = eng.canvas(id).unwrap().opacity;
    assert!(after_first > 0.0);
    eng.should_draw(532.0);
    approx(eng.canvas(id).unwrap().opacity, 1.0, 1e-9);
}

/// it should run kinetic coasting after a drag and settle on its own
#[test]
fn kinetic_coasts_then_settles() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(8000.0, 8000.0)).unwrap();
    eng.resize(800.0, 800.0, 0.0, 0.0, 1.0, 1.0, false);

    // Zoom in so there is room to pan.
    eng.should_draw(0.0);
    eng.fly_to(id, [0.4, 0.4, 0.6, 0.6], 0.0, false);
    eng.should_draw(16.0);

    let mut t = 16.0;
    for _ in 0..10 {
        t += 16.0;
        eng.should_draw(t);
        eng.pan(id, 12.0, 0.0);
    }
    eng.pan_release(id);
    let x_at_release = eng.canvas(id).unwrap().view.center_x;

    // Coasting continues to move the view without further input.
    let mut coasted = false;
    for _ in 0..120 {
        t += 16.0;
        eng.should_draw(t);
        if eng.canvas(id).unwrap().view.center_x > x_at_release + 1e-6 {
            coasted = true;
        }
    }
    assert!(coasted, "kinetic should keep panning after release");
    assert!(!eng.canvas(id).unwrap().kinetic.is_coasting(), "and settle");
}

/// it should animate grid area transitions and restore a stable viewport
#[test]
fn grid_area_transition_animates() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let parent = eng.add_canvas(flat_info(2048.0, 2048.0)).unwrap();
    let child = eng
        .add_child_canvas(
            parent,
            CanvasInfo {
                area: Some([0.0, 0.0, 0.5, 0.5]),
                images: vec![ImageInfo {
                    width: 1024.0,
                    height: 1024.0,
                    tile_size: 1024,
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
        .unwrap();
    eng.resize(1000.0, 1000.0, 0.0, 0.0, 1.0, 1.0, false);
    approx(eng.canvas(child).unwrap().viewport.width, 500.0, 1e-9);

    eng.should_draw(0.0);
    eng.set_area(child, [0.5, 0.5, 1.0, 1.0], false);
    let needs = eng.should_draw(100.0);
    assert!(needs, "area transition needs frames");
    // Mid-transition the cell sits between the two areas.
    let mid = eng.canvas(child).unwrap().current_area;
    assert!(mid[0] > 0.0 && mid[0] < 0.5);

    eng.should_draw(2000.0);
    let end = eng.canvas(child).unwrap().current_area;
    approx(end[0], 0.5, 1e-12);
    approx(eng.canvas(child).unwrap().viewport.left, 500.0, 1e-6);
}

/// it should tolerate a zero-size resize and recover on the next valid one
#[test]
fn zero_resize_is_tolerated() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let id = eng.add_canvas(flat_info(2000.0, 1000.0)).unwrap();

    eng.resize(0.0, 0.0, 0.0, 0.0, 1.0, 1.0, false);
    eng.should_draw(16.0);
    eng.draw();
    eng.pan(id, 10.0, 10.0);
    eng.zoom(id, -1.0, 0.0, 0.0, 0.0);

    eng.resize(500.0, 500.0, 0.0, 0.0, 1.0, 1.0, false);
    eng.should_draw(32.0);
    match &eng.canvas(id).unwrap().controller {
        Controller::Flat(cam) => approx(cam.full_scale, 0.25, 1e-12),
        Controller::Sphere(_) => panic!(),
    }
}

/// it should reject invalid image geometry at construction
#[test]
fn invalid_image_rejected() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    assert!(eng.add_canvas(flat_info(0.0, 1000.0)).is_err());
    let bad_tile = CanvasInfo {
        images: vec![ImageInfo {
            width: 100.0,
            height: 100.0,
            tile_size: 0,
            ..Default::default()
        }],
        ..Default::default()
    };
    assert!(eng.add_canvas(bad_tile).is_err());
}

/// it should remove canvases, children included
#[test]
fn remove_canvas_recurses() {
    let state = Rc::new(RefCell::new(HostState::default()));
    let mut eng = mk_engine(&state, Config::default());
    let parent = eng.add_canvas(flat_info(2048.0, 2048.0)).unwrap();
    let child = eng
        .add_child_canvas(parent, flat_info(1024.0, 1024.0))
        .unwrap();

    assert!(eng.remove_canvas(child));
    assert!(eng.canvas(child).is_none());
    assert!(eng.remove_canvas(parent));
    assert!(!eng.remove_canvas(parent));
}
