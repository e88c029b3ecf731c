// src/props/library.rs
//! Name → source asset lookup for registry pieces.

use std::collections::HashMap;

use bevy::prelude::*;

use super::instancing::buffers::{GeometryRef, StaticMesh};
use super::instancing::material::{Material, MaterialRef};
use super::registry::PieceDef;

/// Meshes and materials that template definitions refer to by name.
#[derive(Resource, Default)]
pub struct AssetLibrary {
    meshes: HashMap<String, GeometryRef>,
    materials: HashMap<String, MaterialRef>,
}

impl AssetLibrary {
    /// Register `mesh` under its own name. Replaces any previous entry.
    pub fn add_mesh(&mut self, mesh: StaticMesh) -> GeometryRef {
        let geometry = GeometryRef::new(mesh);
        self.meshes.insert(geometry.name.clone(), geometry.clone());
        geometry
    }

    pub fn add_material(&mut self, name: impl Into<String>, handle: Handle<StandardMaterial>) -> MaterialRef {
        let name = name.into();
        let material = MaterialRef::new(Material::new(name.clone(), handle));
        self.materials.insert(name, material.clone());
        material
    }

    pub fn mesh(&self, name: &str) -> Option<&GeometryRef> { self.meshes.get(name) }
    pub fn material(&self, name: &str) -> Option<&MaterialRef> { self.materials.get(name) }

    /// Geometry and per-slot materials for a piece definition.
    ///
    /// Unknown names resolve to `None` with a warning. An empty override list
    /// takes the mesh's own slots; a `None` override keeps that slot's default.
    pub fn resolve(&self, piece: &PieceDef) -> (Option<GeometryRef>, Vec<Option<MaterialRef>>) {
        let geometry = piece.mesh.as_deref().and_then(|name| {
            let found = self.mesh(name).cloned();
            if found.is_none() {
                warn!("AssetLibrary: unknown mesh '{}'", name);
            }
            found
        });

        let defaults = geometry.as_ref().map(|g| g.materials.clone()).unwrap_or_default();
        let slots = defaults.len().max(piece.materials.len());
        let materials = (0..slots)
            .map(|slot| match piece.materials.get(slot) {
                Some(Some(name)) => {
                    let found = self.material(name).cloned();
                    if found.is_none() {
                        warn!("AssetLibrary: unknown material '{}'", name);
                    }
                    found
                }
                _ => defaults.get(slot).cloned().flatten(),
            })
            .collect();

        (geometry, materials)
    }
}
