// src/props/instancing/memory.rs
//! Headless host: templates are plain piece lists, sets are vectors of
//! transforms. Useful for offline baking and for exercising the cache
//! without a `World`.

use std::collections::HashSet;

use bevy::prelude::*;

use crate::props::core::{PieceDesc, TemplateId};
use super::buffers::GeometryRef;
use super::combined::CombinedMesh;
use super::host::{InstanceGeometry, InstanceSetHost, MeshAssetHost, TemplateHost};
use super::material::MaterialRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemorySetId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryMeshId(pub usize);

/// A spawned template; just remembers which one.
#[derive(Debug)]
pub struct MemoryInstance(TemplateId);

#[derive(Clone, Debug, Default)]
pub struct MemorySet {
    pub label: String,
    pub geometry: Option<GeometryRef>,
    pub combined: Option<MemoryMeshId>,
    pub materials: Vec<Option<MaterialRef>>,
    pub instances: Vec<Transform>,
    pub alive: bool,
}

#[derive(Default)]
pub struct MemoryHost {
    templates: Vec<Vec<PieceDesc>>,
    live: HashSet<u32>,
    sets: Vec<MemorySet>,
    meshes: Vec<CombinedMesh>,
    /// Template spawns so far (one per cache build).
    pub spawned: u32,
    pub destroyed: u32,
}

impl MemoryHost {
    pub fn add_template(&mut self, pieces: Vec<PieceDesc>) -> TemplateId {
        self.templates.push(pieces);
        TemplateId(self.templates.len() as u32 - 1)
    }

    pub fn set(&self, id: MemorySetId) -> &MemorySet { &self.sets[id.0] }
    pub fn mesh(&self, id: MemoryMeshId) -> &CombinedMesh { &self.meshes[id.0] }

    pub fn live_templates(&self) -> usize { self.live.len() }

    pub fn live_sets(&self) -> usize { self.sets.iter().filter(|s| s.alive).count() }

    /// Instances across every live set.
    pub fn instance_count(&self) -> usize {
        self.sets.iter().filter(|s| s.alive).map(|s| s.instances.len()).sum()
    }
}

impl TemplateHost for MemoryHost {
    type Instance = MemoryInstance;

    fn spawn_template(&mut self, template: TemplateId) -> Option<MemoryInstance> {
        self.templates.get(template.0 as usize)?;
        self.spawned += 1;
        self.live.insert(template.0);
        Some(MemoryInstance(template))
    }

    fn mesh_pieces(&mut self, instance: &MemoryInstance) -> Vec<PieceDesc> {
        self.templates.get(instance.0 .0 as usize).cloned().unwrap_or_default()
    }

    fn destroy_template(&mut self, instance: MemoryInstance) {
        self.destroyed += 1;
        self.live.remove(&instance.0 .0);
    }
}

impl MeshAssetHost for MemoryHost {
    type MeshAsset = MemoryMeshId;

    fn finalize_mesh(&mut self, _owner: &str, mesh: CombinedMesh) -> MemoryMeshId {
        self.meshes.push(mesh);
        MemoryMeshId(self.meshes.len() - 1)
    }
}

impl InstanceSetHost for MemoryHost {
    type Set = MemorySetId;

    fn create_set(&mut self, label: &str) -> MemorySetId {
        self.sets.push(MemorySet { label: label.to_string(), alive: true, ..Default::default() });
        MemorySetId(self.sets.len() - 1)
    }

    fn set_geometry(&mut self, set: MemorySetId, geometry: InstanceGeometry<'_, MemoryMeshId>) {
        let s = &mut self.sets[set.0];
        match geometry {
            InstanceGeometry::Static(g) => s.geometry = Some(g.clone()),
            InstanceGeometry::Combined(m) => s.combined = Some(*m),
        }
    }

    fn set_material(&mut self, set: MemorySetId, slot: usize, material: &MaterialRef) {
        let mats = &mut self.sets[set.0].materials;
        if mats.len() <= slot {
            mats.resize(slot + 1, None);
        }
        mats[slot] = Some(material.clone());
    }

    fn add_instance(&mut self, set: MemorySetId, transform: Transform) {
        self.sets[set.0].instances.push(transform);
    }

    fn clear_instances(&mut self, set: MemorySetId) {
        self.sets[set.0].instances.clear();
    }

    fn destroy_set(&mut self, set: MemorySetId) {
        let s = &mut self.sets[set.0];
        s.alive = false;
        s.instances.clear();
    }
}
