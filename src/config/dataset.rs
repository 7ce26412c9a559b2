//! Dataset section of the config

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::EvalError;

/// Test-set description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Samples per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// (source view, target view) pairs to estimate flow for
    #[serde(default = "default_view_pairs")]
    pub view_pairs: Vec<[usize; 2]>,
    /// Where samples come from
    pub source: DatasetSource,
}

fn default_batch_size() -> usize {
    1
}

fn default_view_pairs() -> Vec<[usize; 2]> {
    vec![[0, 1]]
}

/// Sample provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetSource {
    /// Seeded random rigid-motion scenes
    Synthetic(SyntheticConfig),
    /// One safetensors file per sample
    Directory {
        /// Folder holding `*.safetensors` samples
        root: PathBuf,
    },
}

/// Parameters of the synthetic scene generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of scenes in the test set
    pub num_samples: usize,
    /// Points per view
    pub num_points: usize,
    /// Views per scene, view 0 is the reference
    pub num_views: usize,
    /// Half-size of the cube points are drawn from (meters)
    pub extent: f32,
    /// Largest yaw between two views (degrees)
    pub max_rotation_deg: f32,
    /// Largest translation per axis between two views (meters)
    pub max_translation: f32,
    /// Fraction of points without a true counterpart in the other view
    pub occlusion_ratio: f32,
    /// Gaussian sensor noise on non-reference views (meters)
    pub noise_std: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_samples: 8,
            num_points: 512,
            num_views: 2,
            extent: 2.0,
            max_rotation_deg: 10.0,
            max_translation: 0.3,
            occlusion_ratio: 0.1,
            noise_std: 0.0,
        }
    }
}

impl DatasetConfig {
    /// Number of views each sample carries, when known up front
    pub fn num_views(&self) -> Option<usize> {
        match &self.source {
            DatasetSource::Synthetic(cfg) => Some(cfg.num_views),
            DatasetSource::Directory { .. } => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EvalError::invalid_config("dataset.batch_size must be > 0").into());
        }
        if self.view_pairs.is_empty() {
            return Err(EvalError::invalid_config("dataset.view_pairs must not be empty").into());
        }
        for &[i, j] in &self.view_pairs {
            if i == j {
                return Err(EvalError::invalid_config(format!(
                    "view pair ({}, {}) maps a view onto itself",
                    i, j
                ))
                .into());
            }
            if let Some(n) = self.num_views() {
                if i >= n || j >= n {
                    return Err(EvalError::invalid_config(format!(
                        "view pair ({}, {}) out of range for {} views",
                        i, j, n
                    ))
                    .into());
                }
            }
        }

        if let DatasetSource::Synthetic(cfg) = &self.source {
            if cfg.num_points == 0 || cfg.num_views < 2 {
                return Err(EvalError::invalid_config(
                    "synthetic dataset needs num_points > 0 and num_views >= 2",
                )
                .into());
            }
            if !(0.0..=1.0).contains(&cfg.occlusion_ratio) {
                return Err(EvalError::invalid_config("occlusion_ratio must lie in [0, 1]").into());
            }
            if !(cfg.extent > 0.0 && cfg.extent.is_finite()) || !(cfg.noise_std >= 0.0) {
                return Err(EvalError::invalid_config(
                    "extent must be positive and noise_std non-negative",
                )
                .into());
            }
        }
        Ok(())
    }
}
