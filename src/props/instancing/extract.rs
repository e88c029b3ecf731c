// src/props/instancing/extract.rs
//! Reads render buffers into a flat vertex table + per-triangle material slots.

use bevy::prelude::*;

use crate::props::core::{
    VertexAttributes, DEFAULT_COLOR, DEFAULT_NORMAL, DEFAULT_POSITION, DEFAULT_TANGENT, DEFAULT_TANGENT_SIGN,
    DEFAULT_UV,
};
use super::buffers::RenderBuffers;

/// One detail level, flattened. `triangles[i]` is drawn with slot `triangle_materials[i]`.
#[derive(Clone, Debug, Default)]
pub struct ExtractedGeometry {
    pub attributes: VertexAttributes,
    pub triangles: Vec<[u32; 3]>,
    pub triangle_materials: Vec<u32>,
}

impl ExtractedGeometry {
    /// Triangles drawn with `slot`, in buffer order.
    pub fn triangles_for(&self, slot: u32) -> impl Iterator<Item = &[u32; 3]> + '_ {
        self.triangles
            .iter()
            .zip(&self.triangle_materials)
            .filter(move |(_, m)| **m == slot)
            .map(|(t, _)| t)
    }
}

/// Flatten `buffers`, optionally moving everything through `transform`.
///
/// Attributes shorter than `vertex_count` are padded with their defaults.
/// Triangles with no covering section, an out-of-range index, or a partial
/// trailing triple are dropped.
pub fn extract(buffers: &RenderBuffers, transform: Option<&Transform>) -> ExtractedGeometry {
    let n = buffers.vertex_count as usize;
    let mut attributes = VertexAttributes::with_capacity(n);

    let xf = transform.map(VertexTransform::new);
    for i in 0..n {
        let p = buffers.positions.get(i).copied().unwrap_or(DEFAULT_POSITION);
        let nrm = buffers.normals.get(i).copied().unwrap_or(DEFAULT_NORMAL);
        let tan = buffers.tangents.get(i).copied().unwrap_or(DEFAULT_TANGENT);
        let sign = buffers.tangent_signs.get(i).copied().unwrap_or(DEFAULT_TANGENT_SIGN);
        let uv = buffers.uvs.get(i).copied().unwrap_or(DEFAULT_UV);
        let color = buffers.colors.get(i).copied().unwrap_or(DEFAULT_COLOR);

        match &xf {
            Some(x) => attributes.push(x.point(p), x.normal(nrm), x.tangent(tan).extend(sign * x.handedness), uv, color),
            None => attributes.push(p, nrm, tan.extend(sign), uv, color),
        }
    }

    let tri_count = buffers.num_triangles();
    let mut triangles = Vec::with_capacity(tri_count);
    let mut triangle_materials = Vec::with_capacity(tri_count);
    let mut dropped = 0usize;

    for (t, tri) in buffers.indices.chunks_exact(3).enumerate() {
        let Some(slot) = buffers.material_of_triangle(t as u32) else {
            dropped += 1;
            continue;
        };
        if tri.iter().any(|&i| i as usize >= n) {
            dropped += 1;
            continue;
        }
        triangles.push([tri[0], tri[1], tri[2]]);
        triangle_materials.push(slot);
    }

    if dropped > 0 {
        debug!("extract: dropped {} of {} triangles (no section or bad index)", dropped, tri_count);
    }

    ExtractedGeometry { attributes, triangles, triangle_materials }
}

/// Precomputed pieces of a `Transform` for per-vertex use.
struct VertexTransform {
    matrix: Mat4,
    rotation: Quat,
    scale: Vec3,
    /// `-1.0` when the transform mirrors.
    handedness: f32,
}

impl VertexTransform {
    fn new(t: &Transform) -> Self {
        let handedness = if t.scale.x * t.scale.y * t.scale.z < 0.0 { -1.0 } else { 1.0 };
        Self { matrix: t.compute_matrix(), rotation: t.rotation, scale: t.scale, handedness }
    }

    #[inline]
    fn point(&self, p: Vec3) -> Vec3 { self.matrix.transform_point3(p) }

    /// Inverse-transpose of rotation * scale, renormalized.
    #[inline]
    fn normal(&self, n: Vec3) -> Vec3 {
        (self.rotation * (n / self.scale)).try_normalize().unwrap_or(DEFAULT_NORMAL)
    }

    #[inline]
    fn tangent(&self, t: Vec3) -> Vec3 {
        (self.rotation * (t * self.scale)).try_normalize().unwrap_or(DEFAULT_TANGENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::instancing::buffers::SectionRange;

    fn quad() -> RenderBuffers {
        RenderBuffers::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn missing_attribute_buffers_use_defaults() {
        let ex = extract(&quad().with_normals(vec![Vec3::Z]), None);
        let a = &ex.attributes;

        assert_eq!(a.len(), 4);
        assert_eq!(a.normals.len(), 4);
        assert_eq!(a.normals[0], Vec3::Z);
        assert_eq!(a.normals[3], DEFAULT_NORMAL);
        assert!(a.tangents.iter().all(|t| *t == DEFAULT_TANGENT));
        assert!(a.tangent_signs.iter().all(|w| *w == DEFAULT_TANGENT_SIGN));
        assert!(a.uvs.iter().all(|uv| *uv == DEFAULT_UV));
        assert!(a.colors.iter().all(|c| *c == DEFAULT_COLOR));
    }

    #[test]
    fn declared_vertex_count_beyond_positions_defaults_to_origin() {
        let mut b = quad();
        b.vertex_count = 5;
        let ex = extract(&b, None);
        assert_eq!(ex.attributes.len(), 5);
        assert_eq!(ex.attributes.positions[4], DEFAULT_POSITION);
    }

    #[test]
    fn triangles_take_their_section_material() {
        let b = quad().with_sections(vec![
            SectionRange { material_index: 2, first_index: 0, num_triangles: 1 },
            SectionRange { material_index: 0, first_index: 3, num_triangles: 1 },
        ]);
        let ex = extract(&b, None);
        assert_eq!(ex.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(ex.triangle_materials, vec![2, 0]);
        assert_eq!(ex.triangles_for(0).count(), 1);
    }

    #[test]
    fn drops_uncovered_partial_and_out_of_range_triangles() {
        let mut b = quad();
        b.indices = vec![0, 1, 2, 0, 2, 9, 1, 2];
        b.sections = vec![SectionRange { material_index: 0, first_index: 0, num_triangles: 2 }];
        let ex = extract(&b, None);
        assert_eq!(ex.triangles, vec![[0, 1, 2]]);

        let uncovered = quad().with_sections(vec![SectionRange { material_index: 0, first_index: 3, num_triangles: 1 }]);
        assert_eq!(extract(&uncovered, None).triangles, vec![[0, 2, 3]]);
    }

    #[test]
    fn applies_transform_to_positions_normals_tangents() {
        let b = quad().with_normals(vec![Vec3::Z; 4]).with_tangents(vec![Vec3::X; 4]);
        let t = Transform::from_xyz(10.0, 0.0, 0.0)
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))
            .with_scale(Vec3::splat(2.0));
        let ex = extract(&b, Some(&t));

        for (src, out) in b.positions.iter().zip(&ex.attributes.positions) {
            assert!(out.abs_diff_eq(t.transform_point(*src), 1e-4));
        }
        // +Z rotated 90deg about Y is +X; +X becomes -Z.
        assert!(ex.attributes.normals[0].abs_diff_eq(Vec3::X, 1e-4));
        assert!(ex.attributes.tangents[0].abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }

    #[test]
    fn handedness_survives_and_flips_under_mirroring() {
        let b = quad().with_tangent_signs(vec![-1.0, 1.0, 1.0, -1.0]);
        assert_eq!(extract(&b, None).attributes.tangent_signs, vec![-1.0, 1.0, 1.0, -1.0]);

        let shifted = extract(&b, Some(&Transform::from_xyz(3.0, 0.0, 0.0)));
        assert_eq!(shifted.attributes.tangent_signs, vec![-1.0, 1.0, 1.0, -1.0]);

        let mirrored = extract(&b, Some(&Transform::from_scale(Vec3::new(-1.0, 1.0, 1.0))));
        assert_eq!(mirrored.attributes.tangent_signs, vec![1.0, -1.0, -1.0, 1.0]);
    }
}
