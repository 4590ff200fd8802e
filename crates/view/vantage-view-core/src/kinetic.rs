//! Post-drag inertial motion.
//!
//! Drag deltas accumulate during the gesture; on release they turn into a
//! decaying velocity that keeps feeding the camera until speed falls below a
//! small epsilon. Any new pinch or animation supersedes the motion.

/// Reference tick the velocity is normalized to, ms. Velocities are stored
/// as pixels per tick so event rate does not leak into the result.
const TICK_MS: f64 = 1000.0 / 60.0;

/// Motion within this window before release keeps full velocity; a brief
/// hold before letting go bleeds it off.
const RECENCY_MS: f64 = 250.0;

/// Speed (px per tick) below which the motion is considered settled.
const SETTLE_EPSILON: f64 = 0.05;

#[derive(Clone, Copy, Debug, Default)]
pub struct Kinetic {
    total_x: f64,
    total_y: f64,
    start: f64,
    last_move: f64,
    vx: f64,
    vy: f64,
    dragging: bool,
    coasting: bool,
}

impl Kinetic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a drag gesture, discarding any coasting motion.
    pub fn begin(&mut self, now: f64) {
        *self = Self {
            start: now,
            last_move: now,
            dragging: true,
            ..Self::default()
        };
    }

    /// Accumulate one drag delta (screen px), weighted by elasticity.
    pub fn add(&mut self, dx: f64, dy: f64, now: f64, elasticity: f64) {
        if !self.dragging {
            self.begin(now);
        }
        self.total_x += dx * elasticity;
        self.total_y += dy * elasticity;
        self.last_move = now;
    }

    /// End the gesture and derive the initial velocity from the accumulated
    /// delta over elapsed time, reduced by how long the pointer rested
    /// before release.
    pub fn release(&mut self, now: f64) {
        if !self.dragging {
            return;
        }
        self.dragging = false;
        let elapsed = (now - self.start).max(TICK_MS);
        let recency = 1.0 - ((now - self.last_move) / RECENCY_MS).clamp(0.0, 1.0);
        self.vx = self.total_x / elapsed * TICK_MS * recency;
        self.vy = self.total_y / elapsed * TICK_MS * recency;
        self.coasting = self.speed() >= SETTLE_EPSILON;
    }

    /// Advance one frame. Returns the pixel delta to feed into pan/rotate,
    /// or `None` once settled.
    pub fn step(&mut self, dt_ms: f64, decay: f64) -> Option<(f64, f64)> {
        if !self.coasting {
            return None;
        }
        let ticks = (dt_ms / TICK_MS).clamp(0.0, 4.0);
        let dx = self.vx * ticks;
        let dy = self.vy * ticks;
        let keep = decay.powf(ticks);
        self.vx *= keep;
        self.vy *= keep;
        if self.speed() < SETTLE_EPSILON {
            self.coasting = false;
        }
        Some((dx, dy))
    }

    /// Immediately end the motion (superseded by pinch or animation).
    pub fn stop(&mut self) {
        self.coasting = false;
        self.dragging = false;
        self.vx = 0.0;
        self.vy = 0.0;
    }

    #[inline]
    pub fn is_coasting(&self) -> bool {
        self.coasting
    }

    #[inline]
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    #[inline]
    fn speed(&self) -> f64 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_drag_coasts_after_release() {
        let mut k = Kinetic::new();
        k.begin(0.0);
        for i in 1..=10 {
            k.add(8.0, 0.0, i as f64 * 16.0, 1.0);
        }
        k.release(160.0);
        assert!(k.is_coasting());
        let (dx, _) = k.step(16.0, 0.94).unwrap();
        assert!(dx > 0.0);
    }

    #[test]
    fn pause_before_release_kills_velocity() {
        let mut k = Kinetic::new();
        k.begin(0.0);
        k.add(100.0, 0.0, 16.0, 1.0);
        // Pointer rests for 400 ms before letting go.
        k.release(416.0);
        assert!(!k.is_coasting());
    }

    #[test]
    fn decay_settles_motion() {
        let mut k = Kinetic::new();
        k.begin(0.0);
        for i in 1..=10 {
            k.add(20.0, 10.0, i as f64 * 16.0, 1.0);
        }
        k.release(160.0);
        let mut frames = 0;
        while k.step(16.0, 0.94).is_some() {
            frames += 1;
            assert!(frames < 1000, "kinetic never settled");
        }
        assert!(!k.is_coasting());
    }

    #[test]
    fn stop_supersedes() {
        let mut k = Kinetic::new();
        k.begin(0.0);
        k.add(50.0, 0.0, 16.0, 1.0);
        k.release(32.0);
        k.stop();
        assert!(k.step(16.0, 0.94).is_none());
    }
}
