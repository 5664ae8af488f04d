//! Typed shader uniforms.
//!
//! A [`Uniform`] pairs a name and a [`UniformValue`] with the location its
//! program resolved for it. The value's variant fixes the uniform's
//! [`UniformKind`] for life; [`Uniform::set_data`] swaps values of the same
//! kind, and [`Uniform::bind`] picks the matching context call by matching on
//! the variant and the element count:
//!
//! | value                  | count | call                          |
//! |------------------------|-------|-------------------------------|
//! | `Int` / `Ints`         | 1–4   | `uniform_{n}_i32`             |
//! | `Float` / `Floats`     | 1–4   | `uniform_{n}_f32`             |
//! | `IntVector`            | 1–4   | `uniform_{n}_i32_slice`       |
//! | `FloatVector`          | 1–4   | `uniform_{n}_f32_slice`       |
//! | `Matrix`               | 4/9/16| `uniform_matrix_{2,3,4}_f32_slice` |

use glam::{Vec2, Vec3, Vec4};
use thiserror::Error;

use crate::context::GraphicsContext;
use crate::math::{Matrix3, Matrix4};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UniformError {
    #[error("uniform `{0}` has no resolved location")]
    MissingLocation(String),
    #[error("uniform `{name}` cannot be bound with {count} elements")]
    UnsupportedArity { name: String, count: usize },
    #[error("uniform `{name}` holds {expected:?} data, got {actual:?}")]
    KindMismatch {
        name: String,
        expected: UniformKind,
        actual: UniformKind,
    },
}

/// The type tag of a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    ScalarInt,
    ScalarFloat,
    VectorInt,
    VectorFloat,
    Matrix,
}

/// A uniform's value. The variant decides the [`UniformKind`] and, with the
/// element count, which context call uploads it.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// A single `int`, `bool` or sampler unit.
    Int(i32),
    /// An `ivecN` passed component by component.
    Ints(Vec<i32>),
    Float(f32),
    /// A `vecN` passed component by component.
    Floats(Vec<f32>),
    /// Packed `int`/`ivecN` data, possibly an array.
    IntVector(Vec<i32>),
    /// Packed `float`/`vecN` data, possibly an array.
    FloatVector(Vec<f32>),
    /// Column-major 2×2, 3×3 or 4×4 matrix data.
    Matrix(Vec<f32>),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Int(_) | UniformValue::Ints(_) => UniformKind::ScalarInt,
            UniformValue::Float(_) | UniformValue::Floats(_) => UniformKind::ScalarFloat,
            UniformValue::IntVector(_) => UniformKind::VectorInt,
            UniformValue::FloatVector(_) => UniformKind::VectorFloat,
            UniformValue::Matrix(_) => UniformKind::Matrix,
        }
    }

    /// Element count used when none is set explicitly.
    pub fn len(&self) -> usize {
        match self {
            UniformValue::Int(_) | UniformValue::Float(_) => 1,
            UniformValue::Ints(v) | UniformValue::IntVector(v) => v.len(),
            UniformValue::Floats(v) | UniformValue::FloatVector(v) | UniformValue::Matrix(v) => {
                v.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All components as floats.
    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            UniformValue::Int(i) => vec![*i as f32],
            UniformValue::Float(f) => vec![*f],
            UniformValue::Ints(v) | UniformValue::IntVector(v) => {
                v.iter().map(|&i| i as f32).collect()
            }
            UniformValue::Floats(v) | UniformValue::FloatVector(v) | UniformValue::Matrix(v) => {
                v.clone()
            }
        }
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Int(v as i32)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::FloatVector(v.to_array().to_vec())
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::FloatVector(v.to_array().to_vec())
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::FloatVector(v.to_array().to_vec())
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(v: [f32; N]) -> Self {
        UniformValue::FloatVector(v.to_vec())
    }
}

impl From<Matrix4> for UniformValue {
    fn from(m: Matrix4) -> Self {
        UniformValue::Matrix(m.to_cols_array().to_vec())
    }
}

impl From<Matrix3> for UniformValue {
    fn from(m: Matrix3) -> Self {
        UniformValue::Matrix(m.to_cols_array().to_vec())
    }
}

/// Binding metadata a value cannot carry on its own.
///
/// `count` selects the bind call the way [`Uniform::count`] does, which is how
/// an array such as `uniform vec3 uLights[4]` is described: twelve floats with
/// a count of 3. Fields left as `None` keep what the uniform already has.
///
/// ```
/// use orrery::UniformOptions;
///
/// let lights = UniformOptions::new().count(3);
/// assert_eq!(lights.count, Some(3));
/// assert_eq!(UniformOptions::new().transpose(true).transpose, Some(true));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformOptions {
    pub count: Option<usize>,
    pub transpose: Option<bool>,
}

impl UniformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn transpose(mut self, transpose: bool) -> Self {
        self.transpose = Some(transpose);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_none() && self.transpose.is_none()
    }
}

/// A named, typed shader input bound to one program location.
pub struct Uniform<C: GraphicsContext> {
    name: String,
    value: UniformValue,
    location: Option<C::UniformLocation>,
    count: Option<usize>,
    transpose: bool,
}

impl<C: GraphicsContext> Clone for Uniform<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: self.value.clone(),
            location: self.location.clone(),
            count: self.count,
            transpose: self.transpose,
        }
    }
}

impl<C: GraphicsContext> std::fmt::Debug for Uniform<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uniform")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("location", &self.location)
            .field("count", &self.count)
            .field("transpose", &self.transpose)
            .finish()
    }
}

impl<C: GraphicsContext> Uniform<C> {
    pub fn new(name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            location: None,
            count: None,
            transpose: false,
        }
    }

    pub fn with_location(mut self, location: C::UniformLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Overrides the element count that selects the bind call.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Uploads matrix data transposed. Ignored for other kinds.
    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    pub fn with_options(mut self, options: UniformOptions) -> Self {
        self.apply_options(options);
        self
    }

    /// Takes the count and transpose flag set in `options`, keeping the rest.
    pub fn apply_options(&mut self, options: UniformOptions) {
        if let Some(count) = options.count {
            self.count = Some(count);
        }
        if let Some(transpose) = options.transpose {
            self.transpose = transpose;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformKind {
        self.value.kind()
    }

    pub fn value(&self) -> &UniformValue {
        &self.value
    }

    pub fn location(&self) -> Option<&C::UniformLocation> {
        self.location.as_ref()
    }

    pub fn is_transposed(&self) -> bool {
        self.transpose
    }

    pub fn count(&self) -> usize {
        self.count.unwrap_or_else(|| self.value.len())
    }

    /// Replaces the value, keeping location and kind.
    pub fn set_data(&mut self, value: impl Into<UniformValue>) -> Result<(), UniformError> {
        let value = value.into();
        if value.kind() != self.kind() {
            return Err(UniformError::KindMismatch {
                name: self.name.clone(),
                expected: self.kind(),
                actual: value.kind(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Pushes the current value to the program in use.
    pub fn bind(&self, ctx: &C) -> Result<(), UniformError> {
        let location = self
            .location
            .as_ref()
            .ok_or_else(|| UniformError::MissingLocation(self.name.clone()))?;
        let count = self.count();
        let unsupported = || UniformError::UnsupportedArity {
            name: self.name.clone(),
            count,
        };

        match &self.value {
            UniformValue::Int(x) => ctx.uniform_1_i32(location, *x),
            UniformValue::Float(x) => ctx.uniform_1_f32(location, *x),
            UniformValue::Ints(v) => match (count, v.as_slice()) {
                (1, [x, ..]) => ctx.uniform_1_i32(location, *x),
                (2, [x, y, ..]) => ctx.uniform_2_i32(location, *x, *y),
                (3, [x, y, z, ..]) => ctx.uniform_3_i32(location, *x, *y, *z),
                (4, [x, y, z, w, ..]) => ctx.uniform_4_i32(location, *x, *y, *z, *w),
                _ => return Err(unsupported()),
            },
            UniformValue::Floats(v) => match (count, v.as_slice()) {
                (1, [x, ..]) => ctx.uniform_1_f32(location, *x),
                (2, [x, y, ..]) => ctx.uniform_2_f32(location, *x, *y),
                (3, [x, y, z, ..]) => ctx.uniform_3_f32(location, *x, *y, *z),
                (4, [x, y, z, w, ..]) => ctx.uniform_4_f32(location, *x, *y, *z, *w),
                _ => return Err(unsupported()),
            },
            UniformValue::IntVector(v) => match count {
                1 => ctx.uniform_1_i32_slice(location, v),
                2 => ctx.uniform_2_i32_slice(location, v),
                3 => ctx.uniform_3_i32_slice(location, v),
                4 => ctx.uniform_4_i32_slice(location, v),
                _ => return Err(unsupported()),
            },
            UniformValue::FloatVector(v) => match count {
                1 => ctx.uniform_1_f32_slice(location, v),
                2 => ctx.uniform_2_f32_slice(location, v),
                3 => ctx.uniform_3_f32_slice(location, v),
                4 => ctx.uniform_4_f32_slice(location, v),
                _ => return Err(unsupported()),
            },
            UniformValue::Matrix(v) => match count {
                4 => ctx.uniform_matrix_2_f32_slice(location, self.transpose, v),
                9 => ctx.uniform_matrix_3_f32_slice(location, self.transpose, v),
                16 => ctx.uniform_matrix_4_f32_slice(location, self.transpose, v),
                _ => return Err(unsupported()),
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::software::{SoftUniformLocation, UniformData};
    use crate::context::SoftwareContext;
    use crate::program::Program;
    use std::rc::Rc;

    const VS: &str = "in vec3 aPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat3 uRotation;\nuniform mat2 uShear;\nvoid main() {}";
    const FS: &str = "uniform vec4 uColor;\nuniform vec3 uLights[2];\nuniform ivec2 uFlags;\nuniform int uMode;\nvoid main() {}";

    fn setup() -> (Rc<SoftwareContext>, Program<SoftwareContext>) {
        let ctx = Rc::new(SoftwareContext::new(4, 4));
        let program = Program::new(
            ctx.clone(),
            VS,
            FS,
            &["aPosition"],
            &["uModelViewMatrix", "uRotation", "uShear", "uColor", "uLights", "uFlags", "uMode"],
        )
        .unwrap();
        program.use_program();
        (ctx, program)
    }

    fn located(
        program: &Program<SoftwareContext>,
        name: &str,
        value: impl Into<UniformValue>,
    ) -> Uniform<SoftwareContext> {
        let location: SoftUniformLocation = program.uniform_location(name).unwrap().clone();
        Uniform::new(name, value).with_location(location)
    }

    #[test]
    fn scalar_floats_use_component_calls() {
        let (ctx, program) = setup();
        located(&program, "uColor", UniformValue::Floats(vec![0.1, 0.2, 0.3, 1.0]))
            .bind(&ctx)
            .unwrap();
        assert_eq!(
            ctx.uniform_value(program.handle(), "uColor"),
            Some(UniformData::Floats(vec![0.1, 0.2, 0.3, 1.0]))
        );
    }

    #[test]
    fn vector_arrays_use_slice_calls() {
        let (ctx, program) = setup();
        let lights = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        located(&program, "uLights", UniformValue::FloatVector(lights.clone()))
            .with_count(3)
            .bind(&ctx)
            .unwrap();
        assert_eq!(
            ctx.uniform_value(program.handle(), "uLights"),
            Some(UniformData::Floats(lights))
        );
    }

    #[test]
    fn vector_without_count_over_four_is_rejected() {
        let (ctx, program) = setup();
        let err = located(&program, "uLights", UniformValue::FloatVector(vec![0.0; 6]))
            .bind(&ctx)
            .unwrap_err();
        assert!(matches!(err, UniformError::UnsupportedArity { count: 6, .. }));
    }

    #[test]
    fn matrices_pick_call_by_size() {
        let (ctx, program) = setup();
        located(&program, "uModelViewMatrix", Matrix4::identity())
            .bind(&ctx)
            .unwrap();
        located(&program, "uRotation", Matrix3::identity())
            .bind(&ctx)
            .unwrap();
        located(&program, "uShear", UniformValue::Matrix(vec![1.0, 2.0, 3.0, 4.0]))
            .with_transpose(true)
            .bind(&ctx)
            .unwrap();

        assert_eq!(
            ctx.uniform_value(program.handle(), "uModelViewMatrix"),
            Some(UniformData::Floats(Matrix4::identity().to_cols_array().to_vec()))
        );
        assert_eq!(
            ctx.uniform_value(program.handle(), "uShear"),
            Some(UniformData::Floats(vec![1.0, 3.0, 2.0, 4.0]))
        );

        let bad = located(&program, "uModelViewMatrix", UniformValue::Matrix(vec![0.0; 5]));
        assert!(bad.bind(&ctx).is_err());
    }

    #[test]
    fn ints_and_bools() {
        let (ctx, program) = setup();
        located(&program, "uMode", true).bind(&ctx).unwrap();
        located(&program, "uFlags", UniformValue::Ints(vec![3, 4]))
            .bind(&ctx)
            .unwrap();
        assert_eq!(
            ctx.uniform_value(program.handle(), "uMode"),
            Some(UniformData::Ints(vec![1]))
        );
        assert_eq!(
            ctx.uniform_value(program.handle(), "uFlags"),
            Some(UniformData::Ints(vec![3, 4]))
        );
    }

    #[test]
    fn binding_without_location_fails() {
        let (ctx, _program) = setup();
        let orphan: Uniform<SoftwareContext> = Uniform::new("uColor", [1.0, 1.0, 1.0]);
        assert_eq!(
            orphan.bind(&ctx),
            Err(UniformError::MissingLocation("uColor".into()))
        );
    }

    #[test]
    fn set_data_keeps_kind_and_location() {
        let (_ctx, program) = setup();
        let mut u = located(&program, "uModelViewMatrix", Matrix4::identity());
        let before = u.location().cloned();
        u.set_data(Matrix4::identity().translate(Vec3::X)).unwrap();
        assert_eq!(u.location().cloned(), before);
        assert_eq!(u.value().to_floats()[12], 1.0);

        let err = u.set_data(1.0).unwrap_err();
        assert!(matches!(
            err,
            UniformError::KindMismatch {
                expected: UniformKind::Matrix,
                actual: UniformKind::ScalarFloat,
                ..
            }
        ));
    }

    #[test]
    fn options_override_only_what_they_set() {
        let (ctx, program) = setup();
        let mut lights = located(&program, "uLights", UniformValue::FloatVector(vec![0.0; 6]))
            .with_options(UniformOptions::new().count(3));
        lights.bind(&ctx).unwrap();

        let location = lights.location().cloned();
        lights.apply_options(UniformOptions::new().transpose(true));
        assert_eq!(lights.count(), 3);
        assert!(lights.is_transposed());
        assert_eq!(lights.location().cloned(), location);

        lights.apply_options(UniformOptions::new());
        assert_eq!(lights.count(), 3);
        assert!(lights.is_transposed());
    }

    #[test]
    fn count_defaults_to_length() {
        let u: Uniform<SoftwareContext> = Uniform::new("uColor", Vec3::ONE);
        assert_eq!(u.count(), 3);
        assert_eq!(u.kind(), UniformKind::VectorFloat);
    }
}
