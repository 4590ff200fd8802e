//! Fly-to / zoom / jump animation state machine.
//!
//! One active animation per canvas. States: Idle → Running → {Completed,
//! Aborted}, with an orthogonal paused flag. Completion and abort are
//! mutually exclusive; the canvas fires exactly one host callback per
//! started animation based on the outcome returned here.

use log::debug;

use crate::config::Config;
use crate::ease::Bicubic;
use crate::view::{View, Viewport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Running,
}

/// Options for starting an animation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AniOptions {
    /// Limit-keeping correction; a running correction is retargeted in place
    /// instead of restarted.
    pub correcting: bool,
    /// Large view change: per-edge easing so pan and zoom don't overshoot.
    pub jump: bool,
    /// Interpolate the horizontal center along the shorter angular path
    /// across the wrap seam (spherical canvases).
    pub wrap: bool,
    /// Perspective pair for spherical zoom animations.
    pub perspective: Option<(f64, f64)>,
    /// Discrete omni frame pair, interpolated and floored at apply time.
    pub frames: Option<(f64, f64)>,
}

/// One sampled animation step, ready to apply to the canvas.
#[derive(Clone, Copy, Debug)]
pub struct AniSample {
    pub view: View,
    pub perspective: Option<f64>,
    pub frame: Option<f64>,
    pub progress: f64,
    pub done: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Ani {
    from: View,
    to: View,
    start: f64,
    duration: f64,
    ease: Bicubic,
    opts: AniOptions,
    state: State,
    paused_at: Option<f64>,
    progress: f64,
}

impl Default for Ani {
    fn default() -> Self {
        Self {
            from: View::default(),
            to: View::default(),
            start: 0.0,
            duration: 0.0,
            ease: Bicubic::EASE,
            opts: AniOptions::default(),
            state: State::Idle,
            paused_at: None,
            progress: 0.0,
        }
    }
}

impl Ani {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration for `duration_ms < 0`: the corner-distance metric scaled by
    /// canvas resolution and camera speed, capped by config.
    pub fn auto_duration(from: &View, to: &View, vp: &Viewport, cfg: &Config) -> f64 {
        let resolution = (vp.width * vp.height).max(1.0).sqrt();
        let speed = cfg.camera_speed.max(1e-3);
        (from.distance(to) * resolution * 2.0 / speed).clamp(0.0, cfg.max_ani_duration)
    }

    /// Begin (or retarget) an animation toward `target`.
    ///
    /// Returns `true` when a previously running, non-retargeted animation was
    /// superseded; the caller must fire the abort callback for it.
    pub fn to_view(
        &mut self,
        from: &View,
        target: View,
        duration_ms: f64,
        ease: Bicubic,
        now: f64,
        opts: AniOptions,
    ) -> bool {
        // A running correction absorbs further corrections in place; the
        // clock keeps running so the motion stays continuous.
        if opts.correcting && self.state == State::Running && self.opts.correcting {
            self.to = target;
            return false;
        }

        let superseded = self.state == State::Running;
        self.from = *from;
        self.to = target;
        self.start = now;
        self.duration = duration_ms.max(0.0);
        self.ease = ease;
        self.opts = opts;
        self.state = State::Running;
        self.paused_at = None;
        self.progress = 0.0;
        debug!(
            "ani start: duration={:.0}ms jump={} correcting={}",
            self.duration, opts.jump, opts.correcting
        );
        superseded
    }

    /// Compute the step at `now`. Returns `None` while idle or paused.
    /// On completion the sample carries the exact target and `done = true`,
    /// and the state resets to idle.
    pub fn step(&mut self, now: f64) -> Option<AniSample> {
        if self.state != State::Running || self.paused_at.is_some() {
            return None;
        }

        let p = if self.duration <= 0.0 {
            1.0
        } else {
            ((now - self.start) / self.duration).clamp(0.0, 1.0)
        };
        self.progress = p;

        if p >= 1.0 {
            self.state = State::Idle;
            let mut view = self.to;
            if self.opts.wrap {
                view.wrap_x();
            }
            return Some(AniSample {
                view,
                perspective: self.opts.perspective.map(|(_, to)| to),
                frame: self.opts.frames.map(|(_, to)| to),
                progress: 1.0,
                done: true,
            });
        }

        let view = if self.opts.jump {
            self.sample_jump(p)
        } else {
            self.sample_uniform(self.ease.at(p))
        };

        let eased = self.ease.at(p);
        Some(AniSample {
            view,
            perspective: self
                .opts
                .perspective
                .map(|(a, b)| a + (b - a) * eased),
            frame: self.opts.frames.map(|(a, b)| a + (b - a) * eased),
            progress: p,
            done: false,
        })
    }

    /// Abort a running animation. Returns `true` when one was actually
    /// running; the caller fires the abort callback exactly then.
    pub fn stop(&mut self) -> bool {
        let was_running = self.state == State::Running;
        self.state = State::Idle;
        self.paused_at = None;
        if was_running {
            debug!("ani aborted at progress {:.3}", self.progress);
        }
        was_running
    }

    /// Freeze progress; `resume` shifts the start time by the paused span so
    /// remaining progress is preserved exactly.
    pub fn pause(&mut self, now: f64) {
        if self.state == State::Running && self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: f64) {
        if let Some(paused_at) = self.paused_at.take() {
            self.start += now - paused_at;
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    #[inline]
    pub fn is_correcting(&self) -> bool {
        self.state == State::Running && self.opts.correcting
    }

    #[inline]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    #[inline]
    pub fn target(&self) -> &View {
        &self.to
    }

    /// Uniform easing: interpolate center and size with one curve, taking the
    /// shorter angular path for wrapping canvases.
    fn sample_uniform(&self, eased: f64) -> View {
        let mut view = self.from;
        view.center_x = self.from.center_x + self.dx_center() * eased;
        view.center_y += (self.to.center_y - self.from.center_y) * eased;
        view.width += (self.to.width - self.from.width) * eased;
        view.height += (self.to.height - self.from.height) * eased;
        view.limit = self.to.limit;
        if self.opts.wrap {
            view.wrap_x();
        }
        view
    }

    /// Jump easing: expanding edges ease out, contracting edges ease in, so
    /// a large pan-while-zooming never visually overshoots the target.
    fn sample_jump(&self, p: f64) -> View {
        let p_out = Bicubic::EASE_OUT.at(p);
        let p_in = Bicubic::EASE_IN.at(p);
        let edge = |from: f64, to: f64, expanding: bool| -> f64 {
            let e = if expanding { p_out } else { p_in };
            from + (to - from) * e
        };

        let (fx0, fy0, fx1, fy1) = (self.from.x0(), self.from.y0(), self.from.x1(), self.from.y1());
        let shift = self.dx_center() - (self.to.center_x - self.from.center_x);
        let (tx0, tx1) = (self.to.x0() + shift, self.to.x1() + shift);
        let (ty0, ty1) = (self.to.y0(), self.to.y1());

        let mut view = self.from;
        view.set_corners(
            edge(fx0, tx0, tx0 < fx0),
            edge(fy0, ty0, ty0 < fy0),
            edge(fx1, tx1, tx1 > fx1),
            edge(fy1, ty1, ty1 > fy1),
        );
        view.limit = self.to.limit;
        if self.opts.wrap {
            view.wrap_x();
        }
        view
    }

    /// Horizontal center delta, wrap-aware.
    fn dx_center(&self) -> f64 {
        let d = self.to.center_x - self.from.center_x;
        if self.opts.wrap {
            (d + 0.5).rem_euclid(1.0) - 0.5
        } else {
            d
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_opts() -> AniOptions {
        AniOptions::default()
    }

    #[test]
    fn progress_is_monotonic_and_snaps_to_target() {
        let mut ani = Ani::new();
        let from = View::new(0.5, 0.5, 1.0, 1.0);
        let to = View::new(0.5, 0.5, 0.2, 0.2);
        ani.to_view(&from, to, 1000.0, Bicubic::LINEAR, 0.0, flat_opts());

        let mut last = -1.0;
        for t in [0.0, 250.0, 500.0, 750.0] {
            let s = ani.step(t).unwrap();
            assert!(s.progress >= last);
            assert!(!s.done);
            last = s.progress;
        }
        let end = ani.step(1000.0).unwrap();
        assert_eq!(end.progress, 1.0);
        assert!(end.done);
        assert_eq!(end.view.width, to.width);
        assert!(!ani.is_running());
    }

    #[test]
    fn zero_duration_completes_on_first_step() {
        let mut ani = Ani::new();
        let from = View::default();
        let to = View::new(0.3, 0.3, 0.5, 0.5);
        ani.to_view(&from, to, 0.0, Bicubic::EASE, 10.0, flat_opts());
        let s = ani.step(10.0).unwrap();
        assert!(s.done);
        assert_eq!(s.view.center_x, 0.3);
    }

    #[test]
    fn wrap_takes_shorter_path_across_seam() {
        let mut ani = Ani::new();
        let from = View::new(0.95, 0.5, 0.2, 0.2);
        let to = View::new(0.05, 0.5, 0.2, 0.2);
        ani.to_view(
            &from,
            to,
            1000.0,
            Bicubic::LINEAR,
            0.0,
            AniOptions {
                wrap: true,
                ..Default::default()
            },
        );
        let mid = ani.step(500.0).unwrap();
        // Midpoint of the short path is the seam, not 0.5.
        assert!((mid.view.center_x - 0.0).abs() < 1e-9 || (mid.view.center_x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pause_resume_preserves_remaining_progress() {
        let mut ani = Ani::new();
        let from = View::default();
        let to = View::new(0.5, 0.5, 0.2, 0.2);
        ani.to_view(&from, to, 1000.0, Bicubic::LINEAR, 0.0, flat_opts());
        let before = ani.step(400.0).unwrap().progress;
        ani.pause(400.0);
        assert!(ani.step(900.0).is_none());
        ani.resume(1400.0);
        let after = ani.step(1400.0).unwrap().progress;
        assert!((after - before).abs() < 1e-9);
    }

    #[test]
    fn correction_retargets_in_place() {
        let mut ani = Ani::new();
        let from = View::default();
        let opts = AniOptions {
            correcting: true,
            ..Default::default()
        };
        ani.to_view(&from, View::new(0.4, 0.5, 1.0, 1.0), 500.0, Bicubic::EASE, 0.0, opts);
        let superseded = ani.to_view(
            &from,
            View::new(0.6, 0.5, 1.0, 1.0),
            500.0,
            Bicubic::EASE,
            100.0,
            opts,
        );
        assert!(!superseded);
        assert!((ani.target().center_x - 0.6).abs() < 1e-12);
    }

    #[test]
    fn supersede_reports_previous_run() {
        let mut ani = Ani::new();
        let from = View::default();
        ani.to_view(&from, View::new(0.4, 0.5, 0.5, 0.5), 500.0, Bicubic::EASE, 0.0, flat_opts());
        let superseded = ani.to_view(
            &from,
            View::new(0.6, 0.5, 0.5, 0.5),
            500.0,
            Bicubic::EASE,
            100.0,
            flat_opts(),
        );
        assert!(superseded);
    }
}
