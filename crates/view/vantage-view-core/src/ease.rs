//! Cubic-bezier progress curves.
//!
//! Every animation in the engine maps linear progress through one of these.
//! The x component is inverted with Newton's method (at most 5 iterations);
//! when the derivative degenerates the solver falls back to the raw t, which
//! keeps the curve monotonic at the cost of a slightly off ease.

use serde::{Deserialize, Serialize};

/// A cubic bezier easing curve through (0,0) and (1,1) with control points
/// (x1, y1) and (x2, y2).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bicubic {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Bicubic {
    pub const LINEAR: Bicubic = Bicubic::new(0.0, 0.0, 1.0, 1.0);
    /// Default curve for user-facing camera motion.
    pub const EASE: Bicubic = Bicubic::new(0.25, 0.1, 0.25, 1.0);
    pub const EASE_IN: Bicubic = Bicubic::new(0.42, 0.0, 1.0, 1.0);
    pub const EASE_OUT: Bicubic = Bicubic::new(0.0, 0.0, 0.58, 1.0);
    pub const EASE_IN_OUT: Bicubic = Bicubic::new(0.42, 0.0, 0.58, 1.0);

    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Eased progress for linear progress `t` in [0,1].
    pub fn at(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        // Bezier(0,0,1,1) is exactly linear.
        if self.x1 == 0.0 && self.y1 == 0.0 && self.x2 == 1.0 && self.y2 == 1.0 {
            return t;
        }
        let u = self.solve_x(t);
        cubic(self.y1, self.y2, u)
    }

    /// Invert x(u) = t with Newton's method seeded at t itself.
    fn solve_x(&self, t: f64) -> f64 {
        let mut u = t;
        for _ in 0..5 {
            let x = cubic(self.x1, self.x2, u);
            let err = x - t;
            if err.abs() < 1e-7 {
                return u;
            }
            let d = cubic_derivative(self.x1, self.x2, u);
            if d.abs() < 1e-7 {
                // Degenerate slope: Newton cannot make progress here.
                return t;
            }
            u = (u - err / d).clamp(0.0, 1.0);
        }
        u
    }
}

impl Default for Bicubic {
    fn default() -> Self {
        Bicubic::EASE
    }
}

/// Cubic bezier through 0 and 1 with inner control values p1, p2.
#[inline]
fn cubic(p1: f64, p2: f64, u: f64) -> f64 {
    let v = 1.0 - u;
    3.0 * v * v * u * p1 + 3.0 * v * u * u * p2 + u * u * u
}

#[inline]
fn cubic_derivative(p1: f64, p2: f64, u: f64) -> f64 {
    let v = 1.0 - u;
    3.0 * v * v * p1 + 6.0 * v * u * (p2 - p1) + 3.0 * u * u * (1.0 - p2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_exact() {
        for curve in [Bicubic::LINEAR, Bicubic::EASE, Bicubic::EASE_IN_OUT] {
            assert_eq!(curve.at(0.0), 0.0);
            assert!((curve.at(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn linear_is_identity() {
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((Bicubic::LINEAR.at(t) - t).abs() < 1e-12);
        }
    }

    #[test]
    fn monotonic_non_decreasing() {
        for curve in [Bicubic::EASE, Bicubic::EASE_IN, Bicubic::EASE_OUT] {
            let mut last = 0.0;
            for i in 0..=100 {
                let y = curve.at(i as f64 / 100.0);
                assert!(y >= last - 1e-9, "curve regressed at step {i}");
                last = y;
            }
        }
    }

    #[test]
    fn out_of_range_input_clamps() {
        assert_eq!(Bicubic::EASE.at(-1.0), 0.0);
        assert!((Bicubic::EASE.at(2.0) - 1.0).abs() < 1e-6);
    }
}
