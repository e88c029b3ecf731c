// src/props/instancing/cache.rs
//! Keyed store of built instancing data. At most one build per key.

use std::collections::HashMap;

use bevy::prelude::*;

use crate::props::core::{collect_pieces, CacheKey, SourcePiece, TemplateId};
use crate::props::error::InstancingError;
use crate::props::settings::{BuildStrategy, InstancingSettings};
use super::buffers::GeometryRef;
use super::combined;
use super::host::{InstanceGeometry, InstancingHost, SpawnGuard};
use super::material::{mark_instancing_capable, MaterialRef};
use super::merge::merge_pieces;

/// What to build an entry from.
#[derive(Clone, Copy, Debug)]
pub enum Identity<'a> {
    Template(TemplateId),
    Mesh(&'a GeometryRef),
}

impl Identity<'_> {
    pub fn key(&self) -> CacheKey {
        match self {
            Identity::Template(id) => CacheKey::Template(*id),
            Identity::Mesh(g) => CacheKey::Mesh(g.id()),
        }
    }
}

/// One source piece and the set its placements go to.
#[derive(Clone, Debug)]
pub struct CachedPiece<S> {
    pub geometry: GeometryRef,
    pub relative_transform: Transform,
    pub set: S,
}

/// Built instancing data for one key. Immutable once built; only the
/// instances held by its sets change.
#[derive(Clone, Debug)]
pub enum CachedTypeEntry<S, M> {
    /// Pieces sharing geometry and materials share a set. Empty when the
    /// source had nothing visible to draw.
    PerPiece { key: CacheKey, pieces: Vec<CachedPiece<S>> },
    Merged { key: CacheKey, mesh: M, set: S },
}

impl<S: Copy + Eq, M> CachedTypeEntry<S, M> {
    pub fn key(&self) -> CacheKey {
        match self {
            CachedTypeEntry::PerPiece { key, .. } | CachedTypeEntry::Merged { key, .. } => *key,
        }
    }

    /// Distinct sets owned by this entry.
    pub fn sets(&self) -> Vec<S> {
        match self {
            CachedTypeEntry::PerPiece { pieces, .. } => {
                let mut out: Vec<S> = Vec::with_capacity(pieces.len());
                for p in pieces {
                    if !out.contains(&p.set) { out.push(p.set); }
                }
                out
            }
            CachedTypeEntry::Merged { set, .. } => vec![*set],
        }
    }

    /// Where one placement at `world` lands: `world ∘ relative` per piece,
    /// or `world` for a merged entry.
    pub fn placements(&self, world: Transform) -> Vec<(S, Transform)> {
        match self {
            CachedTypeEntry::PerPiece { pieces, .. } => pieces
                .iter()
                .map(|p| (p.set, world.mul_transform(p.relative_transform)))
                .collect(),
            CachedTypeEntry::Merged { set, .. } => vec![(*set, world)],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub builds: u32,
    pub hits: u32,
    pub failed_builds: u32,
}

pub struct InstanceCache<S, M> {
    settings: InstancingSettings,
    entries: HashMap<CacheKey, CachedTypeEntry<S, M>>,
    stats: CacheStats,
}

impl<S: Copy + Eq + std::fmt::Debug, M: Clone> InstanceCache<S, M> {
    pub fn new(settings: InstancingSettings) -> Self {
        Self { settings, entries: HashMap::new(), stats: CacheStats::default() }
    }

    pub fn settings(&self) -> &InstancingSettings { &self.settings }
    pub fn stats(&self) -> CacheStats { self.stats }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn contains(&self, key: CacheKey) -> bool { self.entries.contains_key(&key) }
    pub fn get(&self, key: CacheKey) -> Option<&CachedTypeEntry<S, M>> { self.entries.get(&key) }
    pub fn entries(&self) -> impl Iterator<Item = &CachedTypeEntry<S, M>> { self.entries.values() }

    /// Cached entry for `identity`, building it first on a miss. A failed
    /// build caches nothing.
    pub fn lookup_or_build<H>(&mut self, host: &mut H, identity: Identity<'_>) -> Result<&CachedTypeEntry<S, M>, InstancingError>
    where
        H: InstancingHost<Set = S, MeshAsset = M>,
    {
        use std::collections::hash_map::Entry;

        let key = identity.key();
        match self.entries.entry(key) {
            Entry::Occupied(e) => {
                self.stats.hits += 1;
                Ok(e.into_mut())
            }
            Entry::Vacant(v) => match build_entry(host, identity, &self.settings) {
                Ok(entry) => {
                    self.stats.builds += 1;
                    Ok(v.insert(entry))
                }
                Err(e) => {
                    self.stats.failed_builds += 1;
                    Err(e)
                }
            },
        }
    }

    /// Clear every placement; entries stay warm.
    pub fn reset_all<H: InstancingHost<Set = S, MeshAsset = M>>(&mut self, host: &mut H) {
        for entry in self.entries.values() {
            for set in entry.sets() {
                host.clear_instances(set);
            }
        }
    }

    /// Clear and destroy every set, then forget every entry.
    pub fn destroy_all<H: InstancingHost<Set = S, MeshAsset = M>>(&mut self, host: &mut H) {
        for (_, entry) in self.entries.drain() {
            for set in entry.sets() {
                host.clear_instances(set);
                host.destroy_set(set);
            }
        }
    }
}

fn build_entry<H: InstancingHost>(
    host: &mut H,
    identity: Identity<'_>,
    settings: &InstancingSettings,
) -> Result<CachedTypeEntry<H::Set, H::MeshAsset>, InstancingError> {
    let key = identity.key();
    match identity {
        Identity::Mesh(geometry) => {
            Ok(build_per_piece(host, key, vec![SourcePiece::from_geometry(geometry.clone())]))
        }
        Identity::Template(id) => {
            // Guard drops at the end of this block, before any set exists.
            let descs = {
                let mut guard = SpawnGuard::spawn(host, id).ok_or(InstancingError::InvalidIdentity(key))?;
                guard.mesh_pieces()
            };
            let pieces = collect_pieces(descs);
            if pieces.is_empty() {
                info!("Instancing: {:?} has no visible mesh pieces; caching an empty entry", key);
                return Ok(CachedTypeEntry::PerPiece { key, pieces: Vec::new() });
            }
            match settings.strategy {
                BuildStrategy::PerPiece => Ok(build_per_piece(host, key, pieces)),
                BuildStrategy::Merged => build_merged(host, key, pieces, settings),
            }
        }
    }
}

fn build_per_piece<H: InstancingHost>(host: &mut H, key: CacheKey, pieces: Vec<SourcePiece>) -> CachedTypeEntry<H::Set, H::MeshAsset> {
    mark_instancing_capable(&pieces);

    let mut shared: Vec<(GeometryRef, Vec<Option<MaterialRef>>, H::Set)> = Vec::new();
    let mut cached = Vec::with_capacity(pieces.len());

    for piece in pieces {
        let existing = shared
            .iter()
            .find(|(g, m, _)| *g == piece.geometry && *m == piece.materials)
            .map(|(_, _, s)| *s);

        let set = match existing {
            Some(s) => s,
            None => {
                let set = host.create_set(&format!("{:?} / {}", key, piece.geometry.name));
                host.set_geometry(set, InstanceGeometry::Static(&piece.geometry));
                apply_materials(host, set, &piece.materials);
                shared.push((piece.geometry.clone(), piece.materials.clone(), set));
                set
            }
        };

        cached.push(CachedPiece { geometry: piece.geometry, relative_transform: piece.relative_transform, set });
    }

    info!("Instancing: built {:?} with {} piece(s) over {} set(s)", key, cached.len(), shared.len());
    CachedTypeEntry::PerPiece { key, pieces: cached }
}

fn build_merged<H: InstancingHost>(
    host: &mut H,
    key: CacheKey,
    pieces: Vec<SourcePiece>,
    settings: &InstancingSettings,
) -> Result<CachedTypeEntry<H::Set, H::MeshAsset>, InstancingError> {
    mark_instancing_capable(&pieces);

    let merged = merge_pieces(&pieces, settings.lod_index, settings.degenerate_threshold)
        .map_err(|source| InstancingError::DegenerateMerge { key, source })?;

    let name = format!("{:?} merged", key);
    let mesh = combined::build(name.clone(), merged, settings.tangents);
    let materials: Vec<Option<MaterialRef>> = mesh.sections.iter().map(|s| s.material.clone()).collect();
    let (sections, triangles) = (mesh.sections.len(), mesh.num_triangles());

    let asset = host.finalize_mesh(&name, mesh);
    let set = host.create_set(&name);
    host.set_geometry(set, InstanceGeometry::Combined(&asset));
    apply_materials(host, set, &materials);

    info!(
        "Instancing: merged {} piece(s) of {:?} into {} section(s), {} triangle(s)",
        pieces.len(), key, sections, triangles
    );
    Ok(CachedTypeEntry::Merged { key, mesh: asset, set })
}

fn apply_materials<H: InstancingHost>(host: &mut H, set: H::Set, materials: &[Option<MaterialRef>]) {
    for (slot, mat) in materials.iter().enumerate() {
        if let Some(m) = mat {
            host.set_material(set, slot, m);
        }
    }
}
