// src/props/instancing/host.rs
//! What the instancing core needs from whoever owns the scene.

use bevy::prelude::*;

use crate::props::core::{PieceDesc, TemplateId};
use super::buffers::GeometryRef;
use super::combined::CombinedMesh;
use super::material::MaterialRef;

/// Realizes templates so their mesh pieces can be inspected.
pub trait TemplateHost {
    type Instance;

    /// `None` if the id does not resolve to a template.
    fn spawn_template(&mut self, template: TemplateId) -> Option<Self::Instance>;

    /// Mesh-bearing elements of a spawned template, in discovery order,
    /// with transforms relative to the template root.
    fn mesh_pieces(&mut self, instance: &Self::Instance) -> Vec<PieceDesc>;

    fn destroy_template(&mut self, instance: Self::Instance);
}

/// Geometry an instance set draws.
pub enum InstanceGeometry<'a, M> {
    Static(&'a GeometryRef),
    Combined(&'a M),
}

/// Renderable sets of placements sharing one geometry.
pub trait InstanceSetHost: MeshAssetHost {
    type Set: Copy + Eq + std::fmt::Debug;

    /// Create a set attached to the host's scene anchor.
    fn create_set(&mut self, label: &str) -> Self::Set;
    fn set_geometry(&mut self, set: Self::Set, geometry: InstanceGeometry<'_, Self::MeshAsset>);
    fn set_material(&mut self, set: Self::Set, slot: usize, material: &MaterialRef);
    /// `transform` is in world space.
    fn add_instance(&mut self, set: Self::Set, transform: Transform);
    fn clear_instances(&mut self, set: Self::Set);
    fn destroy_set(&mut self, set: Self::Set);
}

/// Turns a combined mesh description into the host's own mesh asset.
/// The result lives in memory only.
pub trait MeshAssetHost {
    type MeshAsset: Clone;

    fn finalize_mesh(&mut self, owner: &str, mesh: CombinedMesh) -> Self::MeshAsset;
}

/// Everything a cache build needs.
pub trait InstancingHost: TemplateHost + InstanceSetHost {}
impl<T: TemplateHost + InstanceSetHost> InstancingHost for T {}

/// Spawned template that is destroyed when the guard drops, on every path out.
pub struct SpawnGuard<'h, H: TemplateHost> {
    host: &'h mut H,
    instance: Option<H::Instance>,
}

impl<'h, H: TemplateHost> SpawnGuard<'h, H> {
    pub fn spawn(host: &'h mut H, template: TemplateId) -> Option<Self> {
        let instance = host.spawn_template(template)?;
        Some(Self { host, instance: Some(instance) })
    }

    pub fn mesh_pieces(&mut self) -> Vec<PieceDesc> {
        match &self.instance {
            Some(inst) => self.host.mesh_pieces(inst),
            None => Vec::new(),
        }
    }
}

impl<H: TemplateHost> Drop for SpawnGuard<'_, H> {
    fn drop(&mut self) {
        if let Some(inst) = self.instance.take() {
            self.host.destroy_template(inst);
        }
    }
}
