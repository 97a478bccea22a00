//! Math type aliases and helper functions.
//!
//! Transforms exchanged between the scene graph and the render index are
//! plain column-vector 4x4 matrices (`nalgebra`, f32). Composition follows
//! the usual convention: `parent * child` maps child-local space into the
//! parent's space.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Tolerance used by [`approx_eq`].
pub const MATRIX_EPSILON: f32 = 1e-5;

/// Build a translation-only 4x4 matrix.
pub fn mat4_from_translation(t: Vec3) -> Mat4 {
    Mat4::new_translation(&t)
}

/// Extract the translation column of an affine matrix.
pub fn translation_of(m: &Mat4) -> Vec3 {
    Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Component-wise comparison within [`MATRIX_EPSILON`].
pub fn approx_eq(a: &Mat4, b: &Mat4) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= MATRIX_EPSILON)
}
