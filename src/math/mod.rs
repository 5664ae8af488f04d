//! Immutable vector and matrix types used by cameras, scenes and instances.
//!
//! Every operation returns a new value; nothing here mutates its receiver.
//! Matrices are stored column-major (the layout uniforms are uploaded in) and
//! compose in the order methods are called:
//!
//! ```
//! use orrery::{Matrix4, Vec3};
//!
//! let m = Matrix4::identity()
//!     .translate(Vec3::new(0.0, 0.0, -5.0))
//!     .rotate_deg(45.0, Vec3::Y)
//!     .scale(Vec3::splat(2.0));
//!
//! // Vertices are scaled first, then rotated, then translated.
//! let p = m.transform_point(Vec3::ZERO);
//! assert!((p.z + 5.0).abs() < 1e-5);
//! ```

mod angle;
mod geometry;
mod matrix;
mod vector;

pub use angle::{to_degrees, to_radians, wrap_degrees};
pub use geometry::{
    calculate_normals, compute_normal_matrix, compute_tangents, geometry_bounds, geometry_center,
    transform_vertices,
};
pub use matrix::{Matrix2, Matrix3, Matrix4};
pub use vector::Vector;

use thiserror::Error;

/// Domain errors raised by the algebra library.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlgebraError {
    #[error("vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("cross product is only defined for 3-component vectors, got {0}")]
    CrossDimension(usize),
    #[error("expected a {expected}-component vector, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("cannot normalize a zero-length vector")]
    ZeroLength,
    #[error("matrix is singular and cannot be inverted")]
    Singular,
}

/// Tolerance used by the `approx_eq` helpers.
pub const EPSILON: f32 = 1e-5;
