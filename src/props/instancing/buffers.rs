// src/props/instancing/buffers.rs
//! Source meshes as render-ready buffers, one set per detail level.

use std::ops::Deref;
use std::sync::Arc;

use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, PrimitiveTopology, VertexAttributeValues};

use super::material::MaterialRef;

/// Triangle range of the index buffer drawn with one material slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionRange {
    pub material_index: u32,
    /// Offset into the index buffer (in indices, not triangles).
    pub first_index: u32,
    pub num_triangles: u32,
}

/// Vertex + index buffers of one detail level.
///
/// Attribute buffers may be shorter than `vertex_count`; readers fill the gap
/// with per-attribute defaults.
#[derive(Clone, Debug, Default)]
pub struct RenderBuffers {
    pub vertex_count: u32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    /// Bitangent handedness per vertex, `1.0` or `-1.0`.
    pub tangent_signs: Vec<f32>,
    pub uvs: Vec<Vec2>,
    pub colors: Vec<[u8; 4]>,
    pub indices: Vec<u32>,
    pub sections: Vec<SectionRange>,
}

impl RenderBuffers {
    /// Positions + indices, one section over every triangle using slot 0.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let sections = vec![SectionRange {
            material_index: 0,
            first_index: 0,
            num_triangles: (indices.len() / 3) as u32,
        }];
        Self {
            vertex_count: positions.len() as u32,
            positions,
            indices,
            sections,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self { self.normals = normals; self }
    pub fn with_tangents(mut self, tangents: Vec<Vec3>) -> Self { self.tangents = tangents; self }
    pub fn with_tangent_signs(mut self, signs: Vec<f32>) -> Self { self.tangent_signs = signs; self }
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self { self.uvs = uvs; self }
    pub fn with_colors(mut self, colors: Vec<[u8; 4]>) -> Self { self.colors = colors; self }
    pub fn with_sections(mut self, sections: Vec<SectionRange>) -> Self { self.sections = sections; self }

    #[inline]
    pub fn num_triangles(&self) -> usize { self.indices.len() / 3 }

    /// Material slot of triangle `tri`, if a section covers it.
    pub fn material_of_triangle(&self, tri: u32) -> Option<u32> {
        self.sections.iter().find_map(|s| {
            let first = s.first_index / 3;
            (tri >= first && tri < first.saturating_add(s.num_triangles)).then_some(s.material_index)
        })
    }
}

/// Identity of a shared source mesh (pointer identity of its `Arc`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GeometryId(usize);

/// A static source mesh: detail levels plus the material slots it ships with.
#[derive(Debug)]
pub struct StaticMesh {
    pub name: String,
    /// Level 0 is full detail.
    pub lods: Vec<RenderBuffers>,
    pub materials: Vec<Option<MaterialRef>>,
}

impl StaticMesh {
    pub fn new(name: impl Into<String>, lod0: RenderBuffers) -> Self {
        Self { name: name.into(), lods: vec![lod0], materials: Vec::new() }
    }

    pub fn with_materials(mut self, materials: Vec<Option<MaterialRef>>) -> Self {
        self.materials = materials;
        self
    }

    pub fn lod(&self, index: usize) -> Option<&RenderBuffers> {
        self.lods.get(index)
    }

    /// Read a triangle-list Bevy mesh into level-0 buffers (one section, slot 0).
    pub fn from_bevy_mesh(name: impl Into<String>, mesh: &Mesh) -> Result<Self, MeshConversionError> {
        Ok(Self::new(name, render_buffers_from_mesh(mesh)?))
    }
}

/// Cheap shared handle to a `StaticMesh`.
#[derive(Clone, Debug)]
pub struct GeometryRef(Arc<StaticMesh>);

impl GeometryRef {
    pub fn new(mesh: StaticMesh) -> Self { Self(Arc::new(mesh)) }

    pub fn id(&self) -> GeometryId { GeometryId(Arc::as_ptr(&self.0) as usize) }
}

impl Deref for GeometryRef {
    type Target = StaticMesh;
    fn deref(&self) -> &StaticMesh { &self.0 }
}

impl PartialEq for GeometryRef {
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}
impl Eq for GeometryRef {}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MeshConversionError {
    #[error("Only triangle lists can be instanced (got {0:?})")]
    Topology(PrimitiveTopology),
    #[error("Mesh has no Float32x3 position attribute")]
    MissingPositions,
}

fn render_buffers_from_mesh(mesh: &Mesh) -> Result<RenderBuffers, MeshConversionError> {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return Err(MeshConversionError::Topology(mesh.primitive_topology()));
    }

    let positions: Vec<Vec3> = match mesh.attribute(Mesh::ATTRIBUTE_POSITION) {
        Some(VertexAttributeValues::Float32x3(v)) => v.iter().map(|p| Vec3::from_array(*p)).collect(),
        _ => return Err(MeshConversionError::MissingPositions),
    };

    let indices: Vec<u32> = match mesh.indices() {
        Some(Indices::U32(v)) => v.clone(),
        Some(Indices::U16(v)) => v.iter().map(|&x| x as u32).collect(),
        // Non-indexed triangle list
        None => (0..positions.len() as u32).collect(),
    };

    let normals = match mesh.attribute(Mesh::ATTRIBUTE_NORMAL) {
        Some(VertexAttributeValues::Float32x3(v)) => v.iter().map(|n| Vec3::from_array(*n)).collect(),
        _ => Vec::new(),
    };
    let (tangents, tangent_signs): (Vec<Vec3>, Vec<f32>) = match mesh.attribute(Mesh::ATTRIBUTE_TANGENT) {
        Some(VertexAttributeValues::Float32x4(v)) => v
            .iter()
            .map(|t| (Vec3::new(t[0], t[1], t[2]), if t[3] < 0.0 { -1.0 } else { 1.0 }))
            .unzip(),
        _ => (Vec::new(), Vec::new()),
    };
    let uvs = match mesh.attribute(Mesh::ATTRIBUTE_UV_0) {
        Some(VertexAttributeValues::Float32x2(v)) => v.iter().map(|uv| Vec2::from_array(*uv)).collect(),
        _ => Vec::new(),
    };
    let colors = match mesh.attribute(Mesh::ATTRIBUTE_COLOR) {
        Some(VertexAttributeValues::Float32x4(v)) => v.iter().map(|c| color_to_u8(*c)).collect(),
        _ => Vec::new(),
    };

    Ok(RenderBuffers::new(positions, indices)
        .with_normals(normals)
        .with_tangents(tangents)
        .with_tangent_signs(tangent_signs)
        .with_uvs(uvs)
        .with_colors(colors))
}

#[inline]
fn color_to_u8(c: [f32; 4]) -> [u8; 4] {
    c.map(|ch| (ch.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::asset::RenderAssetUsages;

    #[test]
    fn sections_cover_triangles_by_range() {
        let buffers = RenderBuffers::new(vec![Vec3::ZERO; 6], (0..12).map(|i| i % 6).collect())
            .with_sections(vec![
                SectionRange { material_index: 1, first_index: 0, num_triangles: 1 },
                SectionRange { material_index: 0, first_index: 3, num_triangles: 2 },
            ]);

        assert_eq!(buffers.material_of_triangle(0), Some(1));
        assert_eq!(buffers.material_of_triangle(1), Some(0));
        assert_eq!(buffers.material_of_triangle(2), Some(0));
        assert_eq!(buffers.material_of_triangle(3), None);
    }

    #[test]
    fn oversized_section_does_not_overflow() {
        let buffers = RenderBuffers::new(vec![Vec3::ZERO; 3], vec![0, 1, 2]).with_sections(vec![SectionRange {
            material_index: 4,
            first_index: 3,
            num_triangles: u32::MAX,
        }]);
        assert_eq!(buffers.material_of_triangle(0), None);
        assert_eq!(buffers.material_of_triangle(1), Some(4));
        assert_eq!(buffers.material_of_triangle(u32::MAX - 1), Some(4));
    }

    #[test]
    fn imports_tangent_handedness() {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, vec![[1.0f32, 0.0, 0.0, -1.0], [1.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, -1.0]]);
        let sm = StaticMesh::from_bevy_mesh("mirrored", &mesh).unwrap();
        let lod0 = sm.lod(0).unwrap();
        assert_eq!(lod0.tangents, vec![Vec3::X; 3]);
        assert_eq!(lod0.tangent_signs, vec![-1.0, 1.0, -1.0]);
    }

    #[test]
    fn converts_bevy_cuboid() {
        let mesh = Mesh::from(Cuboid::new(1.0, 1.0, 1.0));
        let sm = StaticMesh::from_bevy_mesh("cube", &mesh).unwrap();
        let lod0 = sm.lod(0).unwrap();

        assert_eq!(lod0.vertex_count as usize, lod0.positions.len());
        assert_eq!(lod0.normals.len(), lod0.positions.len());
        assert_eq!(lod0.uvs.len(), lod0.positions.len());
        assert!(lod0.colors.is_empty());
        assert_eq!(lod0.num_triangles(), 12);
        assert_eq!(lod0.sections.len(), 1);
    }

    #[test]
    fn rejects_line_meshes() {
        let mut mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let err = StaticMesh::from_bevy_mesh("line", &mesh).unwrap_err();
        assert_eq!(err, MeshConversionError::Topology(PrimitiveTopology::LineList));
    }

    #[test]
    fn geometry_identity_is_pointer_identity() {
        let a = GeometryRef::new(StaticMesh::new("a", RenderBuffers::default()));
        let b = GeometryRef::new(StaticMesh::new("a", RenderBuffers::default()));
        assert_eq!(a.id(), a.clone().id());
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }
}
