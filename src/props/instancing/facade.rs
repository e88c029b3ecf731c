// src/props/instancing/facade.rs
//! The operations a host calls: place, reset, destroy, teardown.

use bevy::prelude::*;

use crate::props::core::TemplateId;
use crate::props::error::InstancingError;
use crate::props::settings::InstancingSettings;
use super::buffers::GeometryRef;
use super::cache::{CacheStats, Identity, InstanceCache};
use super::host::InstancingHost;

/// Owns the cache and, through it, every instance set it created.
pub struct InstancingFacade<S, M> {
    cache: InstanceCache<S, M>,
    placed: usize,
}

impl<S: Copy + Eq + std::fmt::Debug, M: Clone> InstancingFacade<S, M> {
    pub fn new(settings: InstancingSettings) -> Self {
        Self { cache: InstanceCache::new(settings), placed: 0 }
    }

    pub fn cache(&self) -> &InstanceCache<S, M> { &self.cache }
    pub fn stats(&self) -> CacheStats { self.cache.stats() }
    pub fn entry_count(&self) -> usize { self.cache.len() }

    /// Placements appended since the last reset/destroy.
    pub fn instance_count(&self) -> usize { self.placed }

    /// Place every piece of `template` at `world`, building the template's
    /// entry on first use. Returns how many instances were appended.
    pub fn place_instance<H>(&mut self, host: &mut H, template: TemplateId, world: Transform) -> Result<usize, InstancingError>
    where
        H: InstancingHost<Set = S, MeshAsset = M>,
    {
        self.place(host, Identity::Template(template), world)
    }

    /// Place one mesh on its own, keyed by the mesh itself.
    pub fn place_mesh_instance<H>(&mut self, host: &mut H, geometry: &GeometryRef, world: Transform) -> Result<usize, InstancingError>
    where
        H: InstancingHost<Set = S, MeshAsset = M>,
    {
        self.place(host, Identity::Mesh(geometry), world)
    }

    fn place<H>(&mut self, host: &mut H, identity: Identity<'_>, world: Transform) -> Result<usize, InstancingError>
    where
        H: InstancingHost<Set = S, MeshAsset = M>,
    {
        let placements = match self.cache.lookup_or_build(host, identity) {
            Ok(entry) => entry.placements(world),
            Err(e) => {
                warn!("Instancing: placement skipped: {}", e);
                return Err(e);
            }
        };
        for (set, transform) in &placements {
            host.add_instance(*set, *transform);
        }
        self.placed += placements.len();
        Ok(placements.len())
    }

    /// Clear all placed instances; built geometry stays cached.
    pub fn reset_all_instances<H: InstancingHost<Set = S, MeshAsset = M>>(&mut self, host: &mut H) {
        self.cache.reset_all(host);
        self.placed = 0;
    }

    /// Clear and destroy every instance set; the next placement rebuilds.
    pub fn destroy_all_instances<H: InstancingHost<Set = S, MeshAsset = M>>(&mut self, host: &mut H) {
        let entries = self.cache.len();
        self.cache.destroy_all(host);
        self.placed = 0;
        if entries > 0 {
            info!("Instancing: destroyed {} cached entr{}", entries, if entries == 1 { "y" } else { "ies" });
        }
    }

    /// Call before the owner leaves the scene.
    pub fn teardown<H: InstancingHost<Set = S, MeshAsset = M>>(&mut self, host: &mut H) {
        self.destroy_all_instances(host);
    }
}
