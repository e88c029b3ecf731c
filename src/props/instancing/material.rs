// src/props/instancing/material.rs
//! Shared material assets and the one-time "usable with instancing" flag.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy::prelude::*;

use crate::props::core::SourcePiece;

/// A material as pieces reference it. The instancing flag lives here, on the
/// shared asset, so it outlasts whichever template instance set it.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    /// What the ECS host draws with.
    pub handle: Handle<StandardMaterial>,
    used_with_instancing: AtomicBool,
}

impl Material {
    pub fn new(name: impl Into<String>, handle: Handle<StandardMaterial>) -> Self {
        Self { name: name.into(), handle, used_with_instancing: AtomicBool::new(false) }
    }

    #[inline]
    pub fn is_instancing_capable(&self) -> bool {
        self.used_with_instancing.load(Ordering::Acquire)
    }

    /// Returns true if this call flipped the flag.
    fn mark_instancing_capable(&self) -> bool {
        !self.used_with_instancing.swap(true, Ordering::AcqRel)
    }
}

/// Cheap shared handle to a `Material`; equality is identity.
#[derive(Clone, Debug)]
pub struct MaterialRef(Arc<Material>);

impl MaterialRef {
    pub fn new(material: Material) -> Self { Self(Arc::new(material)) }

    #[inline]
    fn addr(&self) -> usize { Arc::as_ptr(&self.0) as usize }
}

impl Deref for MaterialRef {
    type Target = Material;
    fn deref(&self) -> &Material { &self.0 }
}

impl PartialEq for MaterialRef {
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}
impl Eq for MaterialRef {}

impl std::hash::Hash for MaterialRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.addr().hash(state) }
}

/// Flag every distinct material the pieces reference directly.
/// Empty slots are skipped. Returns how many materials were newly flagged.
pub fn mark_instancing_capable(pieces: &[SourcePiece]) -> usize {
    let mut seen = HashSet::new();
    let mut newly = 0;
    for mat in pieces.iter().flat_map(|p| p.materials.iter().flatten()) {
        if seen.insert(mat.addr()) && mat.mark_instancing_capable() {
            debug!("Material '{}' flagged for instanced rendering", mat.name);
            newly += 1;
        }
    }
    newly
}
