//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Behavior knobs shared by every canvas. Loaded once at construction
/// (JSON through the wasm adapter) and treated as read-only afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Multiplier on computed fly-to durations; higher is faster.
    pub camera_speed: f64,
    /// Upper bound for auto-computed animation durations, ms.
    pub max_ani_duration: f64,
    /// Canvas crossfade duration, ms (gallery/grid transitions).
    pub crossfade_duration: f64,
    /// Embedded-image fade duration, ms.
    pub embed_fade_duration: f64,
    /// Area (grid cell) transition duration, ms.
    pub area_duration: f64,

    /// Hard zoom-in ceiling as a scale factor over native pixels.
    pub max_scale: f64,
    /// Fraction of the full-fit scale the camera may zoom out to.
    pub min_size: f64,
    /// Allow a layer to be stretched this much before the next finer layer is
    /// selected. 1.0 selects pixel-perfect layers.
    pub under_zoom: f64,

    /// Spherical field-of-view bounds, radians.
    pub min_perspective: f64,
    pub max_perspective: f64,

    /// Drag-delta weighting for kinetic accumulation.
    pub kinetic_elasticity: f64,
    /// Per-step velocity retention for kinetic motion.
    pub kinetic_decay: f64,

    /// Omni frame crossfade duration, ms.
    pub omni_duration: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_speed: 1.0,
            max_ani_duration: 3000.0,
            crossfade_duration: 250.0,
            embed_fade_duration: 500.0,
            area_duration: 350.0,
            max_scale: 1.0,
            min_size: 1.0,
            under_zoom: 1.0,
            min_perspective: 0.1,
            max_perspective: 2.8,
            kinetic_elasticity: 1.0,
            kinetic_decay: 0.94,
            omni_duration: 150.0,
        }
    }
}
