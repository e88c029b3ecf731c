// src/props/instancing/merge.rs
//! Welds several source pieces into one vertex/index table split by material.
//!
//! Order is part of the contract: pieces in discovery order, material slots in
//! ascending order, triangles in buffer order. Same input, same section indices.

use std::collections::HashMap;

use crate::props::core::{SourcePiece, VertexAttributes};
use super::extract::{extract, ExtractedGeometry};
use super::material::MaterialRef;

/// Triangles of one (piece, material) pair, indexing the combined vertex table.
#[derive(Clone, Debug)]
pub struct MaterialSection {
    pub material: Option<MaterialRef>,
    /// Material slot within the source piece.
    pub slot: u32,
    pub triangles: Vec<[u32; 3]>,
}

/// Output of a successful merge.
#[derive(Clone, Debug, Default)]
pub struct MergedGeometry {
    pub vertices: VertexAttributes,
    pub sections: Vec<MaterialSection>,
}

impl MergedGeometry {
    pub fn num_triangles(&self) -> usize {
        self.sections.iter().map(|s| s.triangles.len()).sum()
    }

    pub fn num_indices(&self) -> usize { self.num_triangles() * 3 }
}

/// Too little geometry survived welding to make a renderable mesh.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("merged geometry is degenerate: {vertices} vertices, {indices} indices (need more than {threshold} of each)")]
pub struct DegenerateMerge {
    pub vertices: usize,
    pub indices: usize,
    pub threshold: usize,
}

/// Extract every piece at `lod` (pieces missing that level are skipped) and weld them.
pub fn merge_pieces(pieces: &[SourcePiece], lod: usize, threshold: usize) -> Result<MergedGeometry, DegenerateMerge> {
    let extracted: Vec<(ExtractedGeometry, &[Option<MaterialRef>])> = pieces
        .iter()
        .filter_map(|p| {
            let Some(buffers) = p.geometry.lod(lod) else {
                bevy::log::warn!("merge: mesh '{}' has no LOD {}; piece skipped", p.geometry.name, lod);
                return None;
            };
            Some((extract(buffers, Some(&p.relative_transform)), p.materials.as_slice()))
        })
        .collect();

    merge(&extracted, threshold)
}

/// Weld already-extracted (and already-transformed) pieces.
///
/// Every slot a piece's triangles use gets a section, whether or not the piece
/// names a material for it (unnamed slots carry `None`). Each (piece, slot)
/// pair copies only the vertices its triangles touch, so a section's vertices
/// are contiguous. Pairs with no triangles emit nothing.
/// Fails when the combined vertex or index count is `<= threshold`.
pub fn merge(pieces: &[(ExtractedGeometry, &[Option<MaterialRef>])], threshold: usize) -> Result<MergedGeometry, DegenerateMerge> {
    let mut out = MergedGeometry::default();
    let mut remap: HashMap<u32, u32> = HashMap::new();

    for (geo, materials) in pieces {
        let used = geo.triangle_materials.iter().map(|&m| m as usize + 1).max().unwrap_or(0);
        for slot in 0..materials.len().max(used) {
            let mut triangles = Vec::new();
            remap.clear();

            for tri in geo.triangles_for(slot as u32) {
                let mut welded = [0u32; 3];
                for (corner, &src) in tri.iter().enumerate() {
                    welded[corner] = *remap.entry(src).or_insert_with(|| {
                        let dst = out.vertices.len() as u32;
                        out.vertices.push_from(&geo.attributes, src as usize);
                        dst
                    });
                }
                triangles.push(welded);
            }

            if triangles.is_empty() { continue; }
            let material = materials.get(slot).cloned().flatten();
            out.sections.push(MaterialSection { material, slot: slot as u32, triangles });
        }
    }

    let (vertices, indices) = (out.vertices.len(), out.num_indices());
    if vertices <= threshold || indices <= threshold {
        return Err(DegenerateMerge { vertices, indices, threshold });
    }
    Ok(out)
}
