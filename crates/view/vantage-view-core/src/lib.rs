//! Vantage viewer core (host-agnostic)
//!
//! Computational engine for a deep-zoom image viewer: camera and view models,
//! multi-resolution tile selection and culling, 2D and spherical projection,
//! animation and kinetic inertia. Invoked synchronously once per rendered
//! frame by a host rendering layer; the engine never fetches, decodes or
//! draws anything itself.

pub mod ani;
pub mod camera;
pub mod canvas;
pub mod config;
pub mod ease;
pub mod engine;
pub mod error;
pub mod host;
pub mod ids;
pub mod image;
pub mod kinetic;
pub mod math;
pub mod spherical;
pub mod view;

// Re-exports for consumers (adapters)
pub use ani::{Ani, AniOptions, AniSample};
pub use camera::Camera;
pub use canvas::{parse_canvas_info_json, Canvas, CanvasInfo, Controller, OmniInfo};
pub use config::Config;
pub use ease::Bicubic;
pub use engine::{view_from_corners, Engine};
pub use error::EngineError;
pub use host::{HostHooks, NoopHost};
pub use ids::{CanvasId, IdAllocator, ImageId, TileIndex};
pub use image::{EmbedPlacement, Image, ImageInfo, Layer, TileContext, TileStats};
pub use kinetic::Kinetic;
pub use math::{Mat4, Vec4};
pub use spherical::{SphereWindow, Spherical};
pub use view::{Coordinates, DrawRect, View, Viewport};
