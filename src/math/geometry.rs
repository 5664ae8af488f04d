//! Helpers over flat vertex arrays (`[x0, y0, z0, x1, y1, z1, ...]`).

use glam::{Vec2, Vec3};

use super::{AlgebraError, Matrix4};

/// Normal matrix for a model-view transform: `transpose(inverse(mv))`.
///
/// A singular model-view has no normal matrix and is reported as an error.
pub fn compute_normal_matrix(model_view: &Matrix4) -> Result<Matrix4, AlgebraError> {
    Ok(model_view.inverse()?.transpose())
}

fn position(vertices: &[f32], index: usize) -> Option<Vec3> {
    vertices
        .get(index * 3..index * 3 + 3)
        .map(Vec3::from_slice)
}

fn add_at(out: &mut [f32], index: usize, v: Vec3) {
    if let Some(slot) = out.get_mut(index * 3..index * 3 + 3) {
        slot[0] += v.x;
        slot[1] += v.y;
        slot[2] += v.z;
    }
}

fn normalize_in_place(out: &mut [f32]) {
    for chunk in out.chunks_exact_mut(3) {
        let n = Vec3::from_slice(chunk).normalize_or_zero();
        chunk.copy_from_slice(&n.to_array());
    }
}

/// Smooth per-vertex normals for an indexed triangle list.
///
/// Face normals are accumulated (area weighted) on each corner and then
/// normalized. Triangles referencing missing vertices are skipped, and vertices
/// not used by any triangle get a zero normal.
pub fn calculate_normals(vertices: &[f32], indices: &[u16]) -> Vec<f32> {
    let mut normals = vec![0.0; vertices.len() / 3 * 3];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(p0), Some(p1), Some(p2)) = (
            position(vertices, i0),
            position(vertices, i1),
            position(vertices, i2),
        ) else {
            continue;
        };

        let face = (p1 - p0).cross(p2 - p0);
        for i in [i0, i1, i2] {
            add_at(&mut normals, i, face);
        }
    }

    normalize_in_place(&mut normals);
    normals
}

/// Per-vertex tangents for an indexed triangle list with texture coordinates.
///
/// `uvs` holds two components per vertex. Degenerate UV mappings contribute
/// nothing.
pub fn compute_tangents(vertices: &[f32], uvs: &[f32], indices: &[u16]) -> Vec<f32> {
    let mut tangents = vec![0.0; vertices.len() / 3 * 3];
    let uv = |i: usize| uvs.get(i * 2..i * 2 + 2).map(Vec2::from_slice);

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (Some(p0), Some(p1), Some(p2), Some(t0), Some(t1), Some(t2)) = (
            position(vertices, i0),
            position(vertices, i1),
            position(vertices, i2),
            uv(i0),
            uv(i1),
            uv(i2),
        ) else {
            continue;
        };

        let (e1, e2) = (p1 - p0, p2 - p0);
        let (d1, d2) = (t1 - t0, t2 - t0);
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let tangent = (e1 * d2.y - e2 * d1.y) / det;
        for i in [i0, i1, i2] {
            add_at(&mut tangents, i, tangent);
        }
    }

    normalize_in_place(&mut tangents);
    tangents
}

/// Applies `m` to every position in a flat array.
pub fn transform_vertices(m: &Matrix4, vertices: &[f32]) -> Vec<f32> {
    vertices
        .chunks_exact(3)
        .flat_map(|p| m.transform_point(Vec3::from_slice(p)).to_array())
        .collect()
}

/// Axis-aligned bounds of a flat position array as `(min, max)`.
pub fn geometry_bounds(vertices: &[f32]) -> Option<(Vec3, Vec3)> {
    let mut points = vertices.chunks_exact(3).map(Vec3::from_slice);
    let first = points.next()?;
    Some(points.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
}

/// Centre of the bounding box; `None` for an empty array.
pub fn geometry_center(vertices: &[f32]) -> Option<Vec3> {
    geometry_bounds(vertices).map(|(min, max)| (min + max) * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: [f32; 12] = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 1.0, 0.0,
    ];
    const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn flat_quad_normals_face_z() {
        let normals = calculate_normals(&QUAD, &QUAD_INDICES);
        assert_eq!(normals.len(), 12);
        for n in normals.chunks_exact(3) {
            assert!((Vec3::from_slice(n) - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let normals = calculate_normals(&QUAD, &[0, 1, 9]);
        assert!(normals.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn tangents_follow_u_direction() {
        let uvs = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let tangents = compute_tangents(&QUAD, &uvs, &QUAD_INDICES);
        for t in tangents.chunks_exact(3) {
            assert!((Vec3::from_slice(t) - Vec3::X).length() < 1e-6);
        }
    }

    #[test]
    fn center_of_bounds() {
        let vertices = [0.0, 0.0, 0.0, 2.0, 4.0, 6.0, -2.0, 0.0, 0.0];
        assert_eq!(geometry_center(&vertices), Some(Vec3::new(0.0, 2.0, 3.0)));
        assert_eq!(geometry_center(&[]), None);
    }

    #[test]
    fn transform_moves_every_vertex() {
        let m = Matrix4::identity().translate(Vec3::new(0.0, 0.0, -1.0));
        let moved = transform_vertices(&m, &QUAD);
        assert_eq!(moved.len(), QUAD.len());
        assert!(moved.chunks_exact(3).all(|p| (p[2] + 1.0).abs() < 1e-6));
    }

    #[test]
    fn normal_matrix_of_rotation_is_itself() {
        let mv = Matrix4::identity().rotate_deg(30.0, Vec3::Z);
        let nm = compute_normal_matrix(&mv).unwrap();
        assert!(nm.approx_eq(&mv, 1e-5));
    }

    #[test]
    fn normal_matrix_of_singular_model_view_fails() {
        let mv = Matrix4::identity().scale(Vec3::ZERO);
        assert_eq!(compute_normal_matrix(&mv), Err(AlgebraError::Singular));
    }
}
