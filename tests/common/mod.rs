#![allow(dead_code)]

use bevy::prelude::*;

use prop_instancer::props::core::PieceDesc;
use prop_instancer::props::instancing::{GeometryRef, Material, MaterialRef, RenderBuffers, SectionRange, StaticMesh};

pub const EPS: f32 = 1e-4;

pub fn approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPS)
}

pub fn material(name: &str) -> MaterialRef {
    MaterialRef::new(Material::new(name, Handle::default()))
}

/// `n` separate quads side by side, quad `i` drawn with slot `i`.
/// 4n vertices, 2n triangles.
pub fn quads(name: &str, n: u32) -> GeometryRef {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    let mut sections = Vec::new();
    for q in 0..n {
        let x = q as f32 * 2.0;
        let base = positions.len() as u32;
        positions.extend([
            Vec3::new(x, 0.0, 0.0),
            Vec3::new(x + 1.0, 0.0, 0.0),
            Vec3::new(x + 1.0, 1.0, 0.0),
            Vec3::new(x, 1.0, 0.0),
        ]);
        sections.push(SectionRange { material_index: q, first_index: indices.len() as u32, num_triangles: 2 });
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    let normals = vec![Vec3::Z; positions.len()];
    let buffers = RenderBuffers::new(positions, indices).with_normals(normals).with_sections(sections);
    GeometryRef::new(StaticMesh::new(name, buffers))
}

pub fn single_triangle(name: &str) -> GeometryRef {
    GeometryRef::new(StaticMesh::new(name, RenderBuffers::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2])))
}

/// Visible piece with one fresh material per slot.
pub fn piece(geometry: &GeometryRef, slots: usize, at: Transform) -> PieceDesc {
    PieceDesc {
        geometry: Some(geometry.clone()),
        relative_transform: at,
        visible: true,
        hidden_in_game: false,
        materials: (0..slots).map(|s| Some(material(&format!("{}_{}", geometry.name, s)))).collect(),
    }
}
