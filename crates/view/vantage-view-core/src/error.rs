//! Construction-time errors.
//!
//! The per-frame path never fails: out-of-range values are clamped and
//! invalid views corrected (degrade, don't error). These variants only guard
//! the API surface where the host hands the engine static geometry.

use thiserror::Error;

use crate::ids::CanvasId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidImageSize { width: f64, height: f64 },

    #[error("tile size must be positive, got {0}")]
    InvalidTileSize(u32),

    #[error("unknown canvas {0:?}")]
    UnknownCanvas(CanvasId),

    #[error("canvas descriptor parse error: {0}")]
    Descriptor(#[from] serde_json::Error),
}
