//! # SceneLink Core
//!
//! Engine-agnostic primitives shared by the SceneLink crates:
//!
//! - [`path::ScenePath`] - identifiers in the render-cache namespace
//! - [`math`] - `nalgebra` aliases and transform helpers
//! - [`bounds::Aabb`] - object-space extents
//! - [`profiling`] - optional Tracy instrumentation

pub mod bounds;
pub mod math;
pub mod path;
pub mod profiling;

pub use path::{PathError, ScenePath};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
