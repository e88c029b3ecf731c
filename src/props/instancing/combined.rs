// src/props/instancing/combined.rs
//! Turns welded geometry into a renderable, sectioned mesh description.

use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, PrimitiveTopology};
use serde::{Deserialize, Serialize};

use crate::props::core::VertexAttributes;
use super::material::MaterialRef;
use super::merge::MergedGeometry;

/// What to do with incoming tangents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangentPolicy {
    /// Keep the extracted tangent basis untouched.
    #[default]
    Preserve,
    /// Rebuild tangents from UV gradients, but only where the basis is broken.
    RecomputeInconsistent,
}

/// One draw range of a `CombinedMesh`.
#[derive(Clone, Debug)]
pub struct CombinedSection {
    pub material: Option<MaterialRef>,
    /// Material slot of the source piece this section came from.
    pub slot: u32,
    pub first_index: u32,
    pub num_triangles: u32,
    /// Inclusive vertex window the section's indices fall in.
    pub min_vertex: u32,
    pub max_vertex: u32,
}

/// A built mesh asset. In-memory only: `transient` and CPU-readable.
#[derive(Clone, Debug)]
pub struct CombinedMesh {
    pub name: String,
    pub vertices: VertexAttributes,
    pub indices: Vec<u32>,
    pub sections: Vec<CombinedSection>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub transient: bool,
    pub cpu_access: bool,
}

/// Build a `CombinedMesh` with one section per non-empty material section.
pub fn build(name: impl Into<String>, merged: MergedGeometry, tangents: TangentPolicy) -> CombinedMesh {
    let MergedGeometry { mut vertices, sections: material_sections } = merged;

    let mut indices = Vec::with_capacity(material_sections.iter().map(|s| s.triangles.len() * 3).sum());
    let mut sections = Vec::with_capacity(material_sections.len());

    for ms in material_sections {
        if ms.triangles.is_empty() { continue; }
        let first_index = indices.len() as u32;
        let mut min_vertex = u32::MAX;
        let mut max_vertex = 0;
        for tri in &ms.triangles {
            for &i in tri {
                min_vertex = min_vertex.min(i);
                max_vertex = max_vertex.max(i);
            }
            indices.extend_from_slice(tri);
        }
        sections.push(CombinedSection {
            material: ms.material,
            slot: ms.slot,
            first_index,
            num_triangles: ms.triangles.len() as u32,
            min_vertex,
            max_vertex,
        });
    }

    if tangents == TangentPolicy::RecomputeInconsistent {
        let fixed = recompute_inconsistent_tangents(&mut vertices, &indices);
        if fixed > 0 {
            debug!("combined mesh: rebuilt {} tangents", fixed);
        }
    }

    let (bounds_min, bounds_max) = bounds(&vertices.positions);

    CombinedMesh {
        name: name.into(),
        vertices,
        indices,
        sections,
        bounds_min,
        bounds_max,
        transient: true,
        cpu_access: true,
    }
}

impl CombinedMesh {
    #[inline]
    pub fn num_triangles(&self) -> usize { self.indices.len() / 3 }

    /// One Bevy mesh for section `i`, vertices trimmed to its window and
    /// indices rebased. `None` if `i` is out of range.
    pub fn section_mesh(&self, i: usize) -> Option<Mesh> {
        let s = self.sections.get(i)?;
        let lo = s.min_vertex as usize;
        let hi = s.max_vertex as usize + 1;
        let v = &self.vertices;

        let start = s.first_index as usize;
        let end = start + s.num_triangles as usize * 3;
        let indices: Vec<u32> = self.indices[start..end].iter().map(|&i| i - s.min_vertex).collect();

        let usage = if self.cpu_access {
            RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD
        } else {
            RenderAssetUsages::RENDER_WORLD
        };
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, usage);
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, v.positions[lo..hi].iter().map(|p| p.to_array()).collect::<Vec<_>>());
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, v.normals[lo..hi].iter().map(|n| n.to_array()).collect::<Vec<_>>());
        mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, v.tangents[lo..hi].iter().zip(&v.tangent_signs[lo..hi]).map(|(t, w)| [t.x, t.y, t.z, *w]).collect::<Vec<_>>());
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, v.uvs[lo..hi].iter().map(|uv| uv.to_array()).collect::<Vec<_>>());
        mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, v.colors[lo..hi].iter().map(|c| c.map(|ch| ch as f32 / 255.0)).collect::<Vec<_>>());
        mesh.insert_indices(Indices::U32(indices));
        Some(mesh)
    }
}

fn bounds(positions: &[Vec3]) -> (Vec3, Vec3) {
    if positions.is_empty() {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    positions.iter().fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(lo, hi), p| (lo.min(*p), hi.max(*p)))
}

/// Normal not unit length, tangent zero, or tangent parallel to the normal.
fn basis_is_consistent(n: Vec3, t: Vec3) -> bool {
    (n.length() - 1.0).abs() < 1e-3 && t.length_squared() > 1e-8 && n.cross(t).length_squared() > 1e-6
}

/// UV-gradient tangents, accumulated per triangle, written only to vertices
/// whose basis fails `basis_is_consistent`. Returns how many were rewritten.
fn recompute_inconsistent_tangents(v: &mut VertexAttributes, indices: &[u32]) -> usize {
    let broken: Vec<bool> = v.normals.iter().zip(&v.tangents).map(|(n, t)| !basis_is_consistent(*n, *t)).collect();
    if !broken.iter().any(|b| *b) {
        return 0;
    }

    let mut accum = vec![Vec3::ZERO; v.len()];
    let mut accum_b = vec![Vec3::ZERO; v.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let e1 = v.positions[b] - v.positions[a];
        let e2 = v.positions[c] - v.positions[a];
        let d1 = v.uvs[b] - v.uvs[a];
        let d2 = v.uvs[c] - v.uvs[a];
        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < 1e-12 { continue; }
        let t = (e1 * d2.y - e2 * d1.y) / det;
        let bt = (e2 * d1.x - e1 * d2.x) / det;
        for i in [a, b, c] {
            accum[i] += t;
            accum_b[i] += bt;
        }
    }

    let mut fixed = 0;
    for i in 0..v.len() {
        if !broken[i] { continue; }
        let n = v.normals[i].try_normalize().unwrap_or(Vec3::Y);
        // Gram-Schmidt against the normal.
        let t = (accum[i] - n * n.dot(accum[i]))
            .try_normalize()
            .unwrap_or_else(|| n.any_orthonormal_vector());
        v.normals[i] = n;
        v.tangents[i] = t;
        v.tangent_signs[i] = if n.cross(t).dot(accum_b[i]) < 0.0 { -1.0 } else { 1.0 };
        fixed += 1;
    }
    fixed
}
