//! Synthetic rigid-motion scenes
//!
//! Every view sees the same scene under its own yaw + translation. Ground
//! truth flow for a pair (i, j) carries each observed view-i point through
//! `T_j * T_i^-1`. Occluded points keep their index but their observation in
//! that view is replaced by a random point, so they have no true counterpart.

use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

use super::batch::{Sample, ViewPair};
use super::SampleSource;
use crate::config::SyntheticConfig;

/// Yaw about +z followed by a translation
#[derive(Debug, Clone, Copy)]
struct RigidMotion {
    cos: f32,
    sin: f32,
    translation: [f32; 3],
}

impl RigidMotion {
    const IDENTITY: Self = Self {
        cos: 1.0,
        sin: 0.0,
        translation: [0.0; 3],
    };

    fn random(rng: &mut StdRng, max_rotation_deg: f32, max_translation: f32) -> Self {
        let yaw = if max_rotation_deg > 0.0 {
            rng.gen_range(-max_rotation_deg..=max_rotation_deg).to_radians()
        } else {
            0.0
        };
        let mut translation = [0.0f32; 3];
        if max_translation > 0.0 {
            for t in translation.iter_mut() {
                *t = rng.gen_range(-max_translation..=max_translation);
            }
        }
        Self {
            cos: yaw.cos(),
            sin: yaw.sin(),
            translation,
        }
    }

    fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        [
            self.cos * p[0] - self.sin * p[1] + self.translation[0],
            self.sin * p[0] + self.cos * p[1] + self.translation[1],
            p[2] + self.translation[2],
        ]
    }

    fn apply_inverse(&self, p: [f32; 3]) -> [f32; 3] {
        let q = [
            p[0] - self.translation[0],
            p[1] - self.translation[1],
            p[2] - self.translation[2],
        ];
        [
            self.cos * q[0] + self.sin * q[1],
            -self.sin * q[0] + self.cos * q[1],
            q[2],
        ]
    }
}

/// Deterministic generator: sample `k` depends only on the seed and `k`
pub struct SyntheticScenes {
    config: SyntheticConfig,
    view_pairs: Vec<ViewPair>,
    seed: u64,
}

impl SyntheticScenes {
    /// Generator for `view_pairs` seeded with `seed`
    pub fn new(config: SyntheticConfig, view_pairs: Vec<ViewPair>, seed: u64) -> Self {
        Self {
            config,
            view_pairs,
            seed,
        }
    }

    fn sample_rng(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(
            self.seed
                .wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        )
    }

    fn random_point(&self, rng: &mut StdRng) -> [f32; 3] {
        let e = self.config.extent;
        [
            rng.gen_range(-e..=e),
            rng.gen_range(-e..=e),
            rng.gen_range(-e..=e),
        ]
    }

    fn generate(&self, index: usize) -> Result<Sample> {
        let cfg = &self.config;
        let mut rng = self.sample_rng(index);
        let n = cfg.num_points;

        let scene: Vec<[f32; 3]> = (0..n).map(|_| self.random_point(&mut rng)).collect();

        let mut motions = vec![RigidMotion::IDENTITY];
        for _ in 1..cfg.num_views {
            motions.push(RigidMotion::random(
                &mut rng,
                cfg.max_rotation_deg,
                cfg.max_translation,
            ));
        }

        let noise = Normal::new(0.0f32, cfg.noise_std)?;

        // View 0 is the reference and is never occluded or noisy
        let mut visible = vec![vec![true; n]; cfg.num_views];
        let mut observed: Vec<Vec<[f32; 3]>> = Vec::with_capacity(cfg.num_views);
        for (view, motion) in motions.iter().enumerate() {
            let mut points = Vec::with_capacity(n);
            for (k, &p) in scene.iter().enumerate() {
                let mut q = if view > 0 && rng.gen::<f32>() < cfg.occlusion_ratio {
                    visible[view][k] = false;
                    self.random_point(&mut rng)
                } else {
                    motion.apply(p)
                };
                if view > 0 && cfg.noise_std > 0.0 {
                    for c in q.iter_mut() {
                        *c += noise.sample(&mut rng);
                    }
                }
                points.push(q);
            }
            observed.push(points);
        }

        let device = Device::Cpu;
        let pcs = observed
            .iter()
            .map(|points| points_to_tensor(points, &device))
            .collect::<Result<Vec<_>>>()?;

        let mut flows = BTreeMap::new();
        let mut masks = BTreeMap::new();
        for &(i, j) in &self.view_pairs {
            let (src, dst) = (&motions[i], &motions[j]);
            let flow: Vec<[f32; 3]> = observed[i]
                .iter()
                .map(|&x| {
                    let y = dst.apply(src.apply_inverse(x));
                    [y[0] - x[0], y[1] - x[1], y[2] - x[2]]
                })
                .collect();
            let mask: Vec<f32> = (0..n)
                .map(|k| if visible[i][k] && visible[j][k] { 1.0 } else { 0.0 })
                .collect();

            flows.insert((i, j), points_to_tensor(&flow, &device)?);
            masks.insert((i, j), Tensor::from_vec(mask, n, &device)?);
        }

        Ok(Sample { pcs, flows, masks })
    }
}

impl SampleSource for SyntheticScenes {
    fn len(&self) -> usize {
        self.config.num_samples
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.generate(index)
    }
}

fn points_to_tensor(points: &[[f32; 3]], device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = points.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (points.len(), 3), device)?)
}
