use glam::{Vec3, Vec4};

use super::{AlgebraError, EPSILON};

/// An ordered list of components.
///
/// Dimension is a runtime property: operations between vectors of different
/// dimension fail with [`AlgebraError::DimensionMismatch`].
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Vector {
    elements: Vec<f32>,
}

impl Vector {
    pub fn new(elements: impl Into<Vec<f32>>) -> Self {
        Self {
            elements: elements.into(),
        }
    }

    pub fn zeros(dimension: usize) -> Self {
        Self::new(vec![0.0; dimension])
    }

    pub fn dimension(&self) -> usize {
        self.elements.len()
    }

    /// Component at `index`, or `None` when out of range.
    pub fn at(&self, index: usize) -> Option<f32> {
        self.elements.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.elements
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.elements
    }

    /// Returns a copy with component `index` replaced.
    pub fn with(&self, index: usize, value: f32) -> Self {
        let mut elements = self.elements.clone();
        if let Some(slot) = elements.get_mut(index) {
            *slot = value;
        }
        Self { elements }
    }

    pub fn length(&self) -> f32 {
        self.elements.iter().map(|e| e * e).sum::<f32>().sqrt()
    }

    pub fn negate(&self) -> Self {
        self.map(|e| -e)
    }

    pub fn scale(&self, factor: f32) -> Self {
        self.map(|e| e * factor)
    }

    pub fn sum(&self, other: &Vector) -> Result<Self, AlgebraError> {
        self.zip(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &Vector) -> Result<Self, AlgebraError> {
        self.zip(other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn multiply(&self, other: &Vector) -> Result<Self, AlgebraError> {
        self.zip(other, |a, b| a * b)
    }

    pub fn dot(&self, other: &Vector) -> Result<f32, AlgebraError> {
        self.check_dimension(other)?;
        Ok(self
            .elements
            .iter()
            .zip(&other.elements)
            .map(|(a, b)| a * b)
            .sum())
    }

    /// Cross product; both operands must have exactly three components.
    pub fn cross(&self, other: &Vector) -> Result<Self, AlgebraError> {
        if self.dimension() != 3 {
            return Err(AlgebraError::CrossDimension(self.dimension()));
        }
        if other.dimension() != 3 {
            return Err(AlgebraError::CrossDimension(other.dimension()));
        }
        let (a, b) = (&self.elements, &other.elements);
        Ok(Self::new([
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]))
    }

    /// Unit vector in the same direction.
    ///
    /// The zero vector has no direction and yields [`AlgebraError::ZeroLength`].
    pub fn normalize(&self) -> Result<Self, AlgebraError> {
        let length = self.length();
        if length <= f32::EPSILON {
            return Err(AlgebraError::ZeroLength);
        }
        Ok(self.map(|e| e / length))
    }

    /// Angle between two vectors, in radians.
    pub fn angle(&self, other: &Vector) -> Result<f32, AlgebraError> {
        let denominator = self.length() * other.length();
        if denominator <= f32::EPSILON {
            return Err(AlgebraError::ZeroLength);
        }
        let cos = self.dot(other)? / denominator;
        Ok(cos.clamp(-1.0, 1.0).acos())
    }

    /// Direction angle of a 2D vector measured from the positive X axis, in radians.
    pub fn direction_angle(&self) -> Result<f32, AlgebraError> {
        self.expect_dimension(2)?;
        Ok(self.elements[1].atan2(self.elements[0]))
    }

    /// Rotates a 2D vector about the origin by `degrees`, counter-clockwise.
    pub fn rotate_deg(&self, degrees: f32) -> Result<Self, AlgebraError> {
        self.expect_dimension(2)?;
        let (s, c) = degrees.to_radians().sin_cos();
        let (x, y) = (self.elements[0], self.elements[1]);
        Ok(Self::new([x * c - y * s, x * s + y * c]))
    }

    /// True when the length is 1 within floating tolerance.
    pub fn is_unit(&self) -> bool {
        (self.length() - 1.0).abs() <= EPSILON * 10.0
    }

    pub fn approx_eq(&self, other: &Vector, epsilon: f32) -> bool {
        self.dimension() == other.dimension()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    /// Converts a 3-component vector into a `Vec3`.
    pub fn to_vec3(&self) -> Result<Vec3, AlgebraError> {
        self.expect_dimension(3)?;
        Ok(Vec3::from_slice(&self.elements))
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(self.elements.iter().copied().map(f).collect::<Vec<_>>())
    }

    fn zip(&self, other: &Vector, f: impl Fn(f32, f32) -> f32) -> Result<Self, AlgebraError> {
        self.check_dimension(other)?;
        Ok(Self::new(
            self.elements
                .iter()
                .zip(&other.elements)
                .map(|(a, b)| f(*a, *b))
                .collect::<Vec<_>>(),
        ))
    }

    fn check_dimension(&self, other: &Vector) -> Result<(), AlgebraError> {
        if self.dimension() != other.dimension() {
            return Err(AlgebraError::DimensionMismatch {
                left: self.dimension(),
                right: other.dimension(),
            });
        }
        Ok(())
    }

    fn expect_dimension(&self, expected: usize) -> Result<(), AlgebraError> {
        if self.dimension() != expected {
            return Err(AlgebraError::WrongDimension {
                expected,
                actual: self.dimension(),
            });
        }
        Ok(())
    }
}

impl From<Vec3> for Vector {
    fn from(v: Vec3) -> Self {
        Self::new(v.to_array())
    }
}

impl From<Vec4> for Vector {
    fn from(v: Vec4) -> Self {
        Self::new(v.to_array())
    }
}

impl<const N: usize> From<[f32; N]> for Vector {
    fn from(elements: [f32; N]) -> Self {
        Self::new(elements)
    }
}

impl TryFrom<&Vector> for Vec3 {
    type Error = AlgebraError;

    fn try_from(v: &Vector) -> Result<Self, Self::Error> {
        v.to_vec3()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vector> {
        vec![
            Vector::from([1.0, 0.0, 0.0]),
            Vector::from([0.0, 2.0, 0.0]),
            Vector::from([3.0, -4.0, 12.0]),
            Vector::from([-0.5, 0.25, 7.0]),
            Vector::from([1e-3, 2e-3, -3e-3]),
        ]
    }

    #[test]
    fn normalize_yields_unit_length() {
        for v in samples() {
            let n = v.normalize().unwrap();
            assert!(n.is_unit(), "{v:?} normalized to length {}", n.length());
        }
    }

    #[test]
    fn normalize_zero_vector_is_an_error() {
        assert_eq!(Vector::zeros(3).normalize(), Err(AlgebraError::ZeroLength));
    }

    #[test]
    fn cross_is_orthogonal_and_anticommutative() {
        let vs = samples();
        for a in &vs {
            for b in &vs {
                let ab = a.cross(b).unwrap();
                let ba = b.cross(a).unwrap();
                let tolerance = 1e-5 * (ab.length() + 1.0) * (a.length() + b.length() + 1.0);
                assert!(ab.dot(a).unwrap().abs() <= tolerance);
                assert!(ab.dot(b).unwrap().abs() <= tolerance);
                assert!(ab.approx_eq(&ba.negate(), 1e-5));
            }
        }
    }

    #[test]
    fn cross_requires_three_components() {
        let a = Vector::from([1.0, 0.0]);
        let b = Vector::from([0.0, 1.0]);
        assert_eq!(a.cross(&b), Err(AlgebraError::CrossDimension(2)));
    }

    #[test]
    fn operations_do_not_mutate_the_receiver() {
        let v = Vector::from([1.0, 2.0, 3.0]);
        let _ = v.negate();
        let _ = v.scale(3.0);
        let _ = v.sum(&Vector::from([1.0, 1.0, 1.0])).unwrap();
        assert_eq!(v, Vector::from([1.0, 2.0, 3.0]));
    }

    #[test]
    fn mismatched_dimensions_fail() {
        let a = Vector::from([1.0, 2.0]);
        let b = Vector::from([1.0, 2.0, 3.0]);
        assert!(matches!(
            a.sum(&b),
            Err(AlgebraError::DimensionMismatch { left: 2, right: 3 })
        ));
        assert!(a.dot(&b).is_err());
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = Vector::from([1.0, 0.0]).rotate_deg(90.0).unwrap();
        assert!(v.approx_eq(&Vector::from([0.0, 1.0]), 1e-6));
    }

    #[test]
    fn angle_between_axes() {
        let a = Vector::from([1.0, 0.0, 0.0]);
        let b = Vector::from([0.0, 0.0, 1.0]);
        assert!((a.angle(&b).unwrap() - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
