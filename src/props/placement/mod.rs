// src/props/placement/mod.rs
//! Deterministic scatter helpers for laying out template instances.

use bevy::prelude::*;

mod grid;

pub use grid::{GridParams, GridScatter};

/// Axis-aligned XZ rectangle at a fixed height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub min_xz: Vec2,
    pub max_xz: Vec2,
    pub height: f32,
}

impl Region {
    /// Square of side `size` whose min corner is `origin`.
    pub fn square(origin: Vec2, size: f32) -> Self {
        Self { min_xz: origin, max_xz: origin + Vec2::splat(size), height: 0.0 }
    }
}

/// Helper to clamp a point inside the region.
#[inline]
pub fn clamp_into_region(x: f32, z: f32, region: &Region) -> (f32, f32) {
    (
        x.clamp(region.min_xz.x, region.max_xz.x),
        z.clamp(region.min_xz.y, region.max_xz.y),
    )
}
