//! Column-major 4×4 matrix and homogeneous vector math.
//!
//! Small and local on purpose: the engine needs identity/translate/scale/
//! rotate/perspective, a cofactor inverse, multiply and transform. Nothing
//! that warrants a linear-algebra dependency.

pub mod mat4;
pub mod vec4;

pub use mat4::Mat4;
pub use vec4::Vec4;
