//! Procedural shapes for editor guides and helpers.
//!
//! Each builder returns a plain [`Geometry`]: positions, `u16` indices, the
//! primitive mode to draw them with and a few default uniforms. Turning one
//! into a drawable is a single call:
//!
//! ```
//! use std::rc::Rc;
//! use orrery::context::SoftwareContext;
//! use orrery::geometry;
//!
//! const VS: &str = "in vec3 aVertexPosition;\nuniform mat4 uModelViewMatrix;\nuniform mat4 uProjectionMatrix;\nvoid main() {}";
//! const FS: &str = "uniform vec4 uMaterialDiffuse;\nvoid main() {}";
//!
//! let ctx = Rc::new(SoftwareContext::new(32, 32));
//! let floor = geometry::floor(50.0, 5)
//!     .instance(ctx, "aVertexPosition")
//!     .shaders(VS, FS)
//!     .id("floor")
//!     .build()?;
//! assert_eq!(floor.element_count(), 84);
//! # Ok::<(), orrery::InstanceError>(())
//! ```
//!
//! Shapes compose through the `*ed` helpers rather than through subclasses:
//!
//! ```
//! use orrery::{geometry, Vec3};
//!
//! let guide = geometry::arrow(4.0, 0.5, 12)
//!     .scaled(0.5)
//!     .translated(Vec3::new(0.0, 1.0, 0.0));
//! assert!(guide.bounds().is_some());
//! ```

use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Vec3;

use crate::context::{GraphicsContext, RenderingMode};
use crate::instance::{Attribute, Instance, InstanceBuilder};
use crate::math::{self, Matrix4};
use crate::uniform::UniformValue;

/// Colour given to editor guides (arrows, rotation circles).
pub const GUIDE_COLOR: [f32; 4] = [0.9, 0.0, 0.0, 1.0];

/// Raw geometry ready to become an [`Instance`].
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Flat `xyz` positions.
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    /// Flat `uv` pairs, one per vertex, when the shape is textured.
    pub texture_coords: Option<Vec<f32>>,
    pub mode: RenderingMode,
    pub uniforms: Vec<(String, UniformValue)>,
}

impl Geometry {
    pub fn new(vertices: Vec<f32>, indices: Vec<u16>, mode: RenderingMode) -> Self {
        Self {
            vertices,
            indices,
            texture_coords: None,
            mode,
            uniforms: Vec::new(),
        }
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniforms.push((name.into(), value.into()));
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        math::geometry_bounds(&self.vertices)
    }

    pub fn center(&self) -> Option<Vec3> {
        math::geometry_center(&self.vertices)
    }

    /// Area-weighted per-vertex normals. Only meaningful for triangle lists.
    pub fn normals(&self) -> Vec<f32> {
        math::calculate_normals(&self.vertices, &self.indices)
    }

    pub fn transformed(mut self, m: &Matrix4) -> Self {
        self.vertices = math::transform_vertices(m, &self.vertices);
        self
    }

    pub fn translated(self, offset: Vec3) -> Self {
        self.transformed(&Matrix4::identity().translate(offset))
    }

    pub fn scaled(self, factor: f32) -> Self {
        self.transformed(&Matrix4::identity().scale(Vec3::splat(factor)))
    }

    /// Moves the bounding-box centre to the origin.
    pub fn centered(self) -> Self {
        match self.center() {
            Some(c) => self.translated(-c),
            None => self,
        }
    }

    /// Starts an instance builder with this geometry's positions, indices,
    /// mode and default uniforms filled in. Texture coordinates, when present,
    /// go to `aTextureCoords`.
    pub fn instance<C: GraphicsContext>(
        self,
        ctx: Rc<C>,
        position_attribute: &str,
    ) -> InstanceBuilder<C> {
        let mut builder = Instance::builder(ctx)
            .attribute(position_attribute, Attribute::float(self.vertices, 3))
            .indices(self.indices)
            .mode(self.mode)
            .uniforms(self.uniforms);
        if let Some(uv) = self.texture_coords {
            builder = builder.attribute("aTextureCoords", Attribute::float(uv, 2));
        }
        builder
    }
}

/// A square grid of lines on the XZ plane spanning `[-dimension, dimension]`.
///
/// `lines` sets the spacing: the grid has `2 * dimension / lines + 1` lines in
/// each direction.
pub fn floor(dimension: f32, lines: u32) -> Geometry {
    let count = if lines == 0 {
        1
    } else {
        ((2.0 * dimension) / lines as f32).max(1.0) as usize
    };
    let step = 2.0 * dimension / count as f32;

    let mut along_x = Vec::with_capacity((count + 1) * 6);
    let mut along_z = Vec::with_capacity((count + 1) * 6);
    for l in 0..=count {
        let offset = -dimension + l as f32 * step;
        along_x.extend_from_slice(&[-dimension, 0.0, offset, dimension, 0.0, offset]);
        along_z.extend_from_slice(&[offset, 0.0, -dimension, offset, 0.0, dimension]);
    }
    along_x.extend(along_z);
    let indices = (0..(4 * (count + 1)) as u16).collect();

    Geometry::new(along_x, indices, RenderingMode::Lines)
        .with_uniform("uMaterialDiffuse", [1.0, 1.0, 1.0, 1.0])
}

/// Three axis lines through the origin. The Y axis is half as long.
pub fn axis(dimension: f32) -> Geometry {
    let d = dimension;
    let vertices = vec![
        -d, 0.0, 0.0, d, 0.0, 0.0, //
        0.0, -d / 2.0, 0.0, 0.0, d / 2.0, 0.0, //
        0.0, 0.0, -d, 0.0, 0.0, d,
    ];
    Geometry::new(vertices, (0..6).collect(), RenderingMode::Lines)
        .with_uniform("uMaterialDiffuse", [1.0, 1.0, 1.0, 1.0])
}

fn ring(vertices: &mut Vec<f32>, radius: f32, y: f32, segments: u16) {
    for i in 0..segments {
        let angle = i as f32 / segments as f32 * TAU;
        vertices.extend_from_slice(&[radius * angle.cos(), y, radius * angle.sin()]);
    }
}

/// Cone tip, base ring and base centre.
fn cone_parts(radius: f32, height: f32, segments: u16, base_y: f32) -> (Vec<f32>, Vec<u16>) {
    let mut vertices = vec![0.0, base_y + height, 0.0];
    ring(&mut vertices, radius, base_y, segments);
    vertices.extend_from_slice(&[0.0, base_y, 0.0]);

    let center = segments + 1;
    let mut indices = Vec::with_capacity(segments as usize * 6);
    for i in 1..=segments {
        let next = i % segments + 1;
        indices.extend_from_slice(&[0, i, next]);
    }
    for i in 1..=segments {
        let next = i % segments + 1;
        indices.extend_from_slice(&[next, i, center]);
    }
    (vertices, indices)
}

/// A closed cone standing on the XZ plane with its tip at `y = height`.
pub fn cone(radius: f32, height: f32, segments: u16) -> Geometry {
    let segments = segments.max(3);
    let (vertices, indices) = cone_parts(radius, height, segments, 0.0);
    Geometry::new(vertices, indices, RenderingMode::Triangles)
        .with_uniform("uMaterialDiffuse", GUIDE_COLOR)
}

/// An arrow along +Y: a cylinder shaft topped by a cone a quarter of the total
/// height. The shaft radius is a third of the head radius.
pub fn arrow(height: f32, radius: f32, segments: u16) -> Geometry {
    let segments = segments.max(3);
    let head_height = height / 4.0;
    let shaft_height = height - head_height;
    let (mut vertices, mut indices) = cone_parts(radius, head_height, segments, shaft_height);

    let offset = (vertices.len() / 3) as u16;
    let shaft_radius = radius / 3.0;
    vertices.extend_from_slice(&[0.0, shaft_height, 0.0]);
    ring(&mut vertices, shaft_radius, shaft_height, segments);
    ring(&mut vertices, shaft_radius, 0.0, segments);
    vertices.extend_from_slice(&[0.0, 0.0, 0.0]);

    // Top ring is 1..=segments, bottom ring follows it.
    let bottom_center = 2 * segments + 1;
    for i in 1..=segments {
        let next = i % segments + 1;
        indices.extend([i + segments, next + segments, bottom_center].map(|v| v + offset));
    }
    for i in 1..=segments {
        let next = i % segments + 1;
        indices.extend([i + segments, i, next].map(|v| v + offset));
        indices.extend([next + segments, i + segments, next].map(|v| v + offset));
    }

    Geometry::new(vertices, indices, RenderingMode::Triangles)
        .with_uniform("uMaterialDiffuse", GUIDE_COLOR)
}

/// A torus-like ring in the XY plane: a tube of `tube_radius` swept around a
/// circle of `radius`.
pub fn circle(radius: f32, tube_radius: f32, segments: u16, tube_segments: u16) -> Geometry {
    let segments = segments.max(3);
    let tube_segments = tube_segments.max(3);
    let mut vertices = Vec::with_capacity(segments as usize * tube_segments as usize * 3);
    for i in 0..segments {
        let theta = i as f32 / segments as f32 * TAU;
        let (cx, cy) = (radius * theta.cos(), radius * theta.sin());
        for j in 0..tube_segments {
            let phi = j as f32 / tube_segments as f32 * TAU;
            vertices.extend_from_slice(&[cx + tube_radius * phi.cos(), cy + tube_radius * phi.sin(), 0.0]);
        }
    }

    let mut indices = Vec::with_capacity(segments as usize * tube_segments as usize * 6);
    for i in 0..segments {
        let next_i = (i + 1) % segments;
        for j in 0..tube_segments {
            let next_j = (j + 1) % tube_segments;
            let current = i * tube_segments + j;
            let next = next_i * tube_segments + j;
            let current_next = i * tube_segments + next_j;
            let next_next = next_i * tube_segments + next_j;
            indices.extend_from_slice(&[current, next, current_next, next, next_next, current_next]);
        }
    }

    Geometry::new(vertices, indices, RenderingMode::Triangles)
        .with_uniform("uMaterialDiffuse", GUIDE_COLOR)
}

/// Two triangles covering clip space, with texture coordinates spanning
/// `[0, 1]`.
pub fn full_screen_quad() -> Geometry {
    let vertices = vec![
        -1.0, -1.0, 0.0, //
        1.0, -1.0, 0.0, //
        -1.0, 1.0, 0.0, //
        1.0, 1.0, 0.0,
    ];
    let mut quad = Geometry::new(vertices, vec![0, 1, 2, 2, 1, 3], RenderingMode::Triangles);
    quad.texture_coords = Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    quad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices_in_range(g: &Geometry) -> bool {
        let n = g.vertex_count();
        g.indices.iter().all(|&i| (i as usize) < n)
    }

    #[test]
    fn floor_grid_spans_dimension() {
        let g = floor(50.0, 5);
        // 2 * 50 / 5 = 20 cells, 21 lines per direction, 2 vertices each.
        assert_eq!(g.vertex_count(), 84);
        assert_eq!(g.indices.len(), 84);
        assert_eq!(g.mode, RenderingMode::Lines);
        let (min, max) = g.bounds().unwrap();
        assert_eq!(min, Vec3::new(-50.0, 0.0, -50.0));
        assert_eq!(max, Vec3::new(50.0, 0.0, 50.0));
    }

    #[test]
    fn axis_has_three_lines() {
        let g = axis(10.0);
        assert_eq!(g.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(&g.vertices[6..12], &[0.0, -5.0, 0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn cone_tip_and_base() {
        let g = cone(0.5, 4.0, 12);
        assert_eq!(g.vertex_count(), 14);
        assert_eq!(g.indices.len(), 12 * 6);
        assert!(indices_in_range(&g));
        assert_eq!(&g.vertices[0..3], &[0.0, 4.0, 0.0]);
    }

    #[test]
    fn arrow_head_sits_on_the_shaft() {
        let g = arrow(4.0, 0.5, 12);
        assert!(indices_in_range(&g));
        let (min, max) = g.bounds().unwrap();
        assert!((max.y - 4.0).abs() < 1e-5);
        assert!(min.y.abs() < 1e-5);
        // Cone: 12 sides + 12 base; shaft: 12 bottom + 24 side triangles.
        assert_eq!(g.indices.len(), (12 + 12 + 12 + 24) * 3);
    }

    #[test]
    fn circle_wraps_around() {
        let g = circle(3.0, 0.1, 64, 16);
        assert_eq!(g.vertex_count(), 64 * 16);
        assert!(indices_in_range(&g));
        let (min, max) = g.bounds().unwrap();
        assert!((max.x - 3.1).abs() < 1e-4);
        assert!((min.x + 3.1).abs() < 1e-4);
    }

    #[test]
    fn quad_covers_clip_space() {
        let g = full_screen_quad();
        assert_eq!(g.texture_coords.as_ref().map(Vec::len), Some(8));
        let (min, max) = g.bounds().unwrap();
        assert_eq!((min.x, min.y, max.x, max.y), (-1.0, -1.0, 1.0, 1.0));
    }

    #[test]
    fn centered_moves_bounds_to_origin() {
        let g = cone(1.0, 2.0, 8).translated(Vec3::new(5.0, 0.0, 0.0)).centered();
        let c = g.center().unwrap();
        assert!(c.length() < 1e-5);
    }
}
