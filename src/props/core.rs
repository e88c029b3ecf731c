// src/props/core.rs
//! Core types for template instancing.
//! Keep this file dependency-light; everything else in `props` builds on it.

use bevy::prelude::*; // Vec2, Vec3, Vec4, Transform
use serde::{Deserialize, Serialize};

use crate::props::instancing::buffers::{GeometryId, GeometryRef};
use crate::props::instancing::material::MaterialRef;

// ---------- Ids & cache keys ----------

/// Index of a template in the registry (stable during a session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub u32);

/// What a cache entry is keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A whole template (every visible mesh piece of it).
    Template(TemplateId),
    /// A single source mesh placed on its own.
    Mesh(GeometryId),
}

impl From<TemplateId> for CacheKey {
    fn from(id: TemplateId) -> Self { CacheKey::Template(id) }
}

// ---------- Pieces ----------

/// What a host reports for one mesh-bearing element of a spawned template.
#[derive(Clone, Debug)]
pub struct PieceDesc {
    pub geometry: Option<GeometryRef>,
    /// Transform relative to the template root.
    pub relative_transform: Transform,
    pub visible: bool,
    pub hidden_in_game: bool,
    /// Ordered material slots; `None` where the slot is empty.
    pub materials: Vec<Option<MaterialRef>>,
}

/// A mesh piece that survived filtering. Read-only once extracted.
#[derive(Clone, Debug)]
pub struct SourcePiece {
    pub geometry: GeometryRef,
    pub relative_transform: Transform,
    pub materials: Vec<Option<MaterialRef>>,
}

impl SourcePiece {
    /// `None` when the piece has no geometry, is invisible, or is hidden in game.
    pub fn from_desc(desc: PieceDesc) -> Option<Self> {
        if !desc.visible || desc.hidden_in_game {
            return None;
        }
        let geometry = desc.geometry?;
        Some(Self {
            geometry,
            relative_transform: desc.relative_transform,
            materials: desc.materials,
        })
    }

    /// Whole mesh at the origin, using the mesh's own material slots.
    pub fn from_geometry(geometry: GeometryRef) -> Self {
        let materials = geometry.materials.clone();
        Self { geometry, relative_transform: Transform::IDENTITY, materials }
    }
}

/// Filter host pieces down to the ones worth instancing, keeping discovery order.
pub fn collect_pieces(descs: impl IntoIterator<Item = PieceDesc>) -> Vec<SourcePiece> {
    descs.into_iter().filter_map(SourcePiece::from_desc).collect()
}

// ---------- Vertex data ----------

pub const DEFAULT_POSITION: Vec3 = Vec3::ZERO;
pub const DEFAULT_NORMAL: Vec3 = Vec3::Y;
pub const DEFAULT_TANGENT: Vec3 = Vec3::X;
pub const DEFAULT_TANGENT_SIGN: f32 = 1.0;
pub const DEFAULT_UV: Vec2 = Vec2::ZERO;
pub const DEFAULT_COLOR: [u8; 4] = [255, 255, 255, 255];

/// Struct-of-arrays vertex table. Every array has the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexAttributes {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    /// Bitangent handedness, `1.0` or `-1.0`.
    pub tangent_signs: Vec<f32>,
    pub uvs: Vec<Vec2>,
    pub colors: Vec<[u8; 4]>,
}

impl VertexAttributes {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            positions: Vec::with_capacity(n),
            normals: Vec::with_capacity(n),
            tangents: Vec::with_capacity(n),
            tangent_signs: Vec::with_capacity(n),
            uvs: Vec::with_capacity(n),
            colors: Vec::with_capacity(n),
        }
    }

    #[inline]
    pub fn len(&self) -> usize { self.positions.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.positions.is_empty() }

    /// `tangent` carries the handedness in `w`.
    pub fn push(&mut self, position: Vec3, normal: Vec3, tangent: Vec4, uv: Vec2, color: [u8; 4]) {
        self.positions.push(position);
        self.normals.push(normal);
        self.tangents.push(tangent.truncate());
        self.tangent_signs.push(tangent.w);
        self.uvs.push(uv);
        self.colors.push(color);
    }

    /// Copy vertex `i` of `other` onto the end of this table.
    pub fn push_from(&mut self, other: &VertexAttributes, i: usize) {
        let tangent = other.tangents[i].extend(other.tangent_signs[i]);
        self.push(other.positions[i], other.normals[i], tangent, other.uvs[i], other.colors[i]);
    }
}
