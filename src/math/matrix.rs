use std::ops::Mul;

use glam::{Mat2, Mat3, Mat4, Vec3, Vec4};

use super::{AlgebraError, Vector};

/// A 4×4 transform, stored column-major.
///
/// Builder-style operations post-multiply, so `m.translate(t).rotate(a, axis)`
/// yields `m * T * R`: the last call is the first applied to a vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4(Mat4);

impl Default for Matrix4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix4 {
    pub fn identity() -> Self {
        Self(Mat4::IDENTITY)
    }

    /// Builds a matrix from rows, the way it reads on paper.
    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self(Mat4::from_cols_array_2d(&rows).transpose())
    }

    pub fn from_cols_array(cols: &[f32; 16]) -> Self {
        Self(Mat4::from_cols_array(cols))
    }

    /// Builds a matrix from a column-major slice; `None` unless it has 16 values.
    pub fn from_cols_slice(cols: &[f32]) -> Option<Self> {
        let array: &[f32; 16] = cols.try_into().ok()?;
        Some(Self::from_cols_array(array))
    }

    pub fn as_mat4(&self) -> Mat4 {
        self.0
    }

    /// Element at (`row`, `col`); `None` when out of range.
    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        (row < 4 && col < 4).then(|| self.0.col(col)[row])
    }

    pub fn row(&self, index: usize) -> Option<Vector> {
        (index < 4).then(|| Vector::from(self.0.row(index)))
    }

    pub fn col(&self, index: usize) -> Option<Vector> {
        (index < 4).then(|| Vector::from(self.0.col(index)))
    }

    pub fn multiply(&self, other: &Matrix4) -> Matrix4 {
        Self(self.0 * other.0)
    }

    /// Multiplies a 4-component column vector.
    pub fn multiply_vector(&self, v: &Vector) -> Result<Vector, AlgebraError> {
        if v.dimension() != 4 {
            return Err(AlgebraError::WrongDimension {
                expected: 4,
                actual: v.dimension(),
            });
        }
        Ok(Vector::from(self.0 * Vec4::from_slice(v.as_slice())))
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.0.transform_point3(p)
    }

    pub fn translate(&self, offset: Vec3) -> Matrix4 {
        Self(self.0 * Mat4::from_translation(offset))
    }

    /// Rotates by `radians` about `axis`. A zero axis leaves the matrix unchanged.
    pub fn rotate(&self, radians: f32, axis: Vec3) -> Matrix4 {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return *self;
        }
        Self(self.0 * Mat4::from_axis_angle(axis, radians))
    }

    pub fn rotate_deg(&self, degrees: f32, axis: Vec3) -> Matrix4 {
        self.rotate(degrees.to_radians(), axis)
    }

    /// Rotates about X, then Y, then Z by the components of `degrees`.
    pub fn rotate_vec_deg(&self, degrees: Vec3) -> Matrix4 {
        self.rotate_deg(degrees.x, Vec3::X)
            .rotate_deg(degrees.y, Vec3::Y)
            .rotate_deg(degrees.z, Vec3::Z)
    }

    pub fn scale(&self, factors: Vec3) -> Matrix4 {
        Self(self.0 * Mat4::from_scale(factors))
    }

    pub fn transpose(&self) -> Matrix4 {
        Self(self.0.transpose())
    }

    pub fn determinant(&self) -> f32 {
        self.0.determinant()
    }

    pub fn inverse(&self) -> Result<Matrix4, AlgebraError> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(AlgebraError::Singular);
        }
        Ok(Self(self.0.inverse()))
    }

    /// Right-handed perspective projection with a vertical field of view in degrees.
    pub fn perspective(fovy_degrees: f32, aspect: f32, near: f32, far: f32) -> Matrix4 {
        Self(Mat4::perspective_rh_gl(
            fovy_degrees.to_radians(),
            aspect,
            near,
            far,
        ))
    }

    /// Right-handed orthographic projection of the given box.
    pub fn orthographic(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Matrix4 {
        Self(Mat4::orthographic_rh_gl(left, right, bottom, top, near, far))
    }

    /// First row of the rotation block: the camera's X axis for a view matrix.
    pub fn right_vector(&self) -> Vec3 {
        self.0.row(0).truncate()
    }

    /// Second row of the rotation block: the camera's Y axis for a view matrix.
    pub fn up_vector(&self) -> Vec3 {
        self.0.row(1).truncate()
    }

    /// Third row of the rotation block: the camera's Z axis for a view matrix.
    pub fn normal_vector(&self) -> Vec3 {
        self.0.row(2).truncate()
    }

    pub fn to_cols_array(&self) -> [f32; 16] {
        self.0.to_cols_array()
    }

    pub fn approx_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.0.abs_diff_eq(other.0, epsilon)
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        self.multiply(&rhs)
    }
}

impl From<Mat4> for Matrix4 {
    fn from(m: Mat4) -> Self {
        Self(m)
    }
}

/// A 3×3 matrix, stored column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix3(Mat3);

impl Default for Matrix3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix3 {
    pub fn identity() -> Self {
        Self(Mat3::IDENTITY)
    }

    pub fn from_rows(rows: [[f32; 3]; 3]) -> Self {
        Self(Mat3::from_cols_array_2d(&rows).transpose())
    }

    /// Upper-left 3×3 block of a 4×4 matrix.
    pub fn from_matrix4(m: &Matrix4) -> Self {
        Self(Mat3::from_mat4(m.as_mat4()))
    }

    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        (row < 3 && col < 3).then(|| self.0.col(col)[row])
    }

    pub fn multiply(&self, other: &Matrix3) -> Matrix3 {
        Self(self.0 * other.0)
    }

    pub fn transpose(&self) -> Matrix3 {
        Self(self.0.transpose())
    }

    pub fn determinant(&self) -> f32 {
        self.0.determinant()
    }

    pub fn inverse(&self) -> Result<Matrix3, AlgebraError> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(AlgebraError::Singular);
        }
        Ok(Self(self.0.inverse()))
    }

    pub fn to_cols_array(&self) -> [f32; 9] {
        self.0.to_cols_array()
    }

    pub fn approx_eq(&self, other: &Matrix3, epsilon: f32) -> bool {
        self.0.abs_diff_eq(other.0, epsilon)
    }
}

/// A 2×2 matrix, stored column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix2(Mat2);

impl Default for Matrix2 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix2 {
    pub fn identity() -> Self {
        Self(Mat2::IDENTITY)
    }

    pub fn from_rows(rows: [[f32; 2]; 2]) -> Self {
        Self(Mat2::from_cols_array_2d(&rows).transpose())
    }

    pub fn at(&self, row: usize, col: usize) -> Option<f32> {
        (row < 2 && col < 2).then(|| self.0.col(col)[row])
    }

    pub fn multiply(&self, other: &Matrix2) -> Matrix2 {
        Self(self.0 * other.0)
    }

    pub fn transpose(&self) -> Matrix2 {
        Self(self.0.transpose())
    }

    pub fn determinant(&self) -> f32 {
        self.0.determinant()
    }

    pub fn inverse(&self) -> Result<Matrix2, AlgebraError> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(AlgebraError::Singular);
        }
        Ok(Self(self.0.inverse()))
    }

    pub fn to_cols_array(&self) -> [f32; 4] {
        self.0.to_cols_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::EPSILON;

    fn samples() -> Vec<Matrix4> {
        vec![
            Matrix4::identity(),
            Matrix4::identity().translate(Vec3::new(1.0, -2.0, 3.0)),
            Matrix4::identity()
                .rotate_deg(30.0, Vec3::Y)
                .scale(Vec3::new(2.0, 0.5, 1.0)),
            Matrix4::from_rows([
                [2.0, 0.0, 1.0, 4.0],
                [1.0, 3.0, 0.0, -1.0],
                [0.0, 1.0, 1.0, 2.0],
                [0.0, 0.0, 0.0, 1.0],
            ]),
            Matrix4::perspective(45.0, 1.5, 0.1, 100.0),
        ]
    }

    #[test]
    fn identity_is_neutral_on_both_sides() {
        let id = Matrix4::identity();
        for m in samples() {
            assert!(id.multiply(&m).approx_eq(&m, EPSILON));
            assert!(m.multiply(&id).approx_eq(&m, EPSILON));
        }
    }

    #[test]
    fn inverse_round_trips_to_identity() {
        for m in samples() {
            let inv = m.inverse().unwrap();
            assert!(m.multiply(&inv).approx_eq(&Matrix4::identity(), 1e-4));
        }
    }

    #[test]
    fn singular_matrix_cannot_be_inverted() {
        let m = Matrix4::identity().scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(m.inverse(), Err(AlgebraError::Singular));
        let rows = Matrix4::from_rows([
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 4.0, 6.0, 8.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert!(rows.inverse().is_err());
    }

    #[test]
    fn translations_compose_additively() {
        let t1 = Vec3::new(1.0, 2.0, 3.0);
        let t2 = Vec3::new(-4.0, 0.5, 10.0);
        let chained = Matrix4::identity().translate(t1).translate(t2);
        let summed = Matrix4::identity().translate(t1 + t2);
        assert!(chained.approx_eq(&summed, EPSILON));
    }

    #[test]
    fn composition_is_ordered() {
        let tr = Matrix4::identity()
            .translate(Vec3::new(5.0, 0.0, 0.0))
            .rotate_deg(90.0, Vec3::Y);
        let rt = Matrix4::identity()
            .rotate_deg(90.0, Vec3::Y)
            .translate(Vec3::new(5.0, 0.0, 0.0));
        assert!(!tr.approx_eq(&rt, 1e-3));

        // Rotation applies first, then the translation.
        let p = tr.transform_point(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(5.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn from_rows_reads_like_paper() {
        let m = Matrix4::from_rows([
            [1.0, 0.0, 0.0, 7.0],
            [0.0, 1.0, 0.0, 8.0],
            [0.0, 0.0, 1.0, 9.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(m.at(0, 3), Some(7.0));
        assert_eq!(m.at(4, 0), None);
        assert!(m.approx_eq(
            &Matrix4::identity().translate(Vec3::new(7.0, 8.0, 9.0)),
            EPSILON
        ));
    }

    #[test]
    fn perspective_matches_standard_form() {
        let m = Matrix4::perspective(90.0, 2.0, 1.0, 3.0);
        // f = 1 / tan(45°) = 1
        assert!((m.at(0, 0).unwrap() - 0.5).abs() < 1e-6);
        assert!((m.at(1, 1).unwrap() - 1.0).abs() < 1e-6);
        assert!((m.at(2, 2).unwrap() + 2.0).abs() < 1e-6);
        assert!((m.at(2, 3).unwrap() + 3.0).abs() < 1e-6);
        assert_eq!(m.at(3, 2), Some(-1.0));
    }

    #[test]
    fn orthographic_maps_box_to_clip_cube() {
        let m = Matrix4::orthographic(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let corner = m.transform_point(Vec3::new(2.0, 1.0, -10.0));
        assert!((corner - Vec3::new(1.0, 1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn axis_vectors_are_rows() {
        let m = Matrix4::identity().rotate_deg(90.0, Vec3::Y);
        assert!((m.right_vector() - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
        assert!((m.up_vector() - Vec3::Y).length() < 1e-5);
        assert!((m.normal_vector() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn multiply_vector_requires_four_components() {
        let m = Matrix4::identity();
        assert!(m.multiply_vector(&Vector::from([1.0, 2.0, 3.0])).is_err());
        let v = m
            .translate(Vec3::X)
            .multiply_vector(&Vector::from([0.0, 0.0, 0.0, 1.0]))
            .unwrap();
        assert_eq!(v, Vector::from([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn lower_rank_inverses() {
        let m3 = Matrix3::from_rows([[2.0, 0.0, 0.0], [0.0, 4.0, 0.0], [1.0, 0.0, 1.0]]);
        let inv = m3.inverse().unwrap();
        assert!(m3.multiply(&inv).approx_eq(&Matrix3::identity(), 1e-5));

        let m2 = Matrix2::from_rows([[1.0, 2.0], [2.0, 4.0]]);
        assert_eq!(m2.determinant(), 0.0);
        assert_eq!(m2.inverse(), Err(AlgebraError::Singular));
    }
}
