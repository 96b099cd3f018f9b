pub use glam::{
    uvec2, vec2, vec3, vec4, BVec3, Mat3, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles,
};
pub use rayon::prelude::*;
pub mod bsdf;
pub mod config;
pub mod error;
pub mod expr;
pub mod film;
pub mod geometry;
pub mod graph;
pub mod integrator;
pub mod interaction;
mod microfacet;
pub mod model;
pub mod pipeline;
pub mod sampling;
pub mod sdf;
pub mod util;
pub mod value;

pub use error::*;
pub use geometry::*;
pub use value::{Value, ValueHandle, ValueType, VariableContainer};

pub const PI: f32 = std::f32::consts::PI;
pub const FRAC_1_PI: f32 = std::f32::consts::FRAC_1_PI;
pub const FRAC_PI_2: f32 = std::f32::consts::FRAC_PI_2;

/// Sentinel distance reported by hit tests that found nothing.
pub const NO_HIT: f32 = f32::MAX;

#[inline]
pub fn mix<T, S>(x: T, y: T, a: S) -> T
where
    T: std::ops::Sub<Output = T> + std::ops::Add<Output = T> + std::ops::Mul<S, Output = T> + Copy,
    S: Copy,
{
    x + (y - x) * a
}
