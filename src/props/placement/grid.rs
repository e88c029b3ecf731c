// src/props/placement/grid.rs
//! Jittered grid scatter (deterministic per seed and region key).

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{clamp_into_region, Region};

#[derive(Clone, Copy, Debug)]
pub struct GridParams {
    pub cell: f32,   // meters
    pub jitter: f32, // 0..=0.5 (fraction of cell)
    pub cap: usize,  // absolute cap
}

pub struct GridScatter {
    params: GridParams,
    seed: u64,
}

impl GridScatter {
    pub fn new(cell: f32, jitter: f32, cap: usize, seed: u64) -> Self {
        let j = jitter.clamp(0.0, 0.5);
        Self { params: GridParams { cell, jitter: j, cap }, seed }
    }

    #[inline]
    fn rng_for(&self, region: &Region, key: u32) -> ChaCha8Rng {
        // Stable per (seed, region origin, key)
        let mix = self.seed
            ^ ((region.min_xz.x.to_bits() as u64) << 16)
            ^ ((region.min_xz.y.to_bits() as u64) << 32)
            ^ ((key as u64) << 48)
            ^ 0xA5A5_5A5A_D3F0_1234u64;
        ChaCha8Rng::seed_from_u64(mix)
    }

    /// One transform per cell, row by row: jittered position, random yaw.
    pub fn scatter(&self, region: &Region, key: u32) -> Vec<Transform> {
        let cell = self.params.cell.max(0.0001);
        let jitter = self.params.jitter;

        let size = region.max_xz - region.min_xz;
        let nx = (size.x / cell).floor().max(1.0) as i32;
        let nz = (size.y / cell).floor().max(1.0) as i32;

        let mut rng = self.rng_for(region, key);
        let mut out = Vec::with_capacity(((nx * nz) as usize).min(self.params.cap));

        'outer: for j in 0..nz {
            for i in 0..nx {
                if out.len() >= self.params.cap { break 'outer; }

                // Cell center
                let cx = region.min_xz.x + (i as f32 + 0.5) * cell;
                let cz = region.min_xz.y + (j as f32 + 0.5) * cell;

                // Jitter
                let jx = (rng.random::<f32>() - 0.5) * 2.0 * (jitter * cell);
                let jz = (rng.random::<f32>() - 0.5) * 2.0 * (jitter * cell);

                let (x, z) = clamp_into_region(cx + jx, cz + jz, region);
                let rot_y = rng.random_range(0.0..std::f32::consts::TAU);

                out.push(Transform::from_xyz(x, region.height, z).with_rotation(Quat::from_rotation_y(rot_y)));
            }
        }
        out
    }
}
