//! Evaluation configuration
//!
//! A single YAML file names the model to build and carries everything it
//! needs: hyperparameters, the test dataset, the metric thresholds and an
//! optional weights checkpoint.

mod dataset;

pub use dataset::{DatasetConfig, DatasetSource, SyntheticConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::EvalError;

/// Top-level configuration, loaded once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registered model name (see [`crate::models::available_models`])
    pub model: String,
    /// Seed for every random source of the run
    #[serde(default)]
    pub seed: u64,
    /// Safetensors checkpoint, relative to the config file
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Test dataset
    pub dataset: DatasetConfig,
    /// Model hyperparameters
    #[serde(default)]
    pub hparams: HyperParams,
    /// Metric thresholds
    #[serde(default)]
    pub metrics: MetricThresholds,
}

/// Model hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperParams {
    /// Hidden width of learned heads
    pub hidden_dim: usize,
    /// Number of hidden layers in learned heads
    pub num_layers: usize,
    /// Training-mode flag; cleared by `FlowModel::eval`
    pub is_training: bool,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            num_layers: 2,
            is_training: true,
        }
    }
}

/// Error thresholds used by the accuracy and outlier metrics (meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    /// AccS: absolute or relative error below this
    pub strict_threshold: f32,
    /// AccR: absolute or relative error below this; also the relative outlier bound
    pub relax_threshold: f32,
    /// Outlier: absolute error above this
    pub outlier_threshold: f32,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            strict_threshold: 0.05,
            relax_threshold: 0.1,
            outlier_threshold: 0.3,
        }
    }
}

impl ModelConfig {
    /// Load and validate a config file.
    ///
    /// Relative `checkpoint` and `directory` dataset paths are resolved
    /// against the directory holding the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from YAML text without touching the filesystem
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(ckpt) = self.checkpoint.as_mut() {
            if ckpt.is_relative() {
                *ckpt = base_dir.join(&*ckpt);
            }
        }
        if let DatasetSource::Directory { root } = &mut self.dataset.source {
            if root.is_relative() {
                *root = base_dir.join(&*root);
            }
        }
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(EvalError::invalid_config("`model` must name a model").into());
        }
        self.dataset.validate()?;

        let t = &self.metrics;
        if t.strict_threshold <= 0.0 || t.relax_threshold <= 0.0 || t.outlier_threshold <= 0.0 {
            return Err(EvalError::invalid_config("metric thresholds must be positive").into());
        }
        if t.strict_threshold > t.relax_threshold {
            return Err(EvalError::invalid_config(format!(
                "strict_threshold ({}) exceeds relax_threshold ({})",
                t.strict_threshold, t.relax_threshold
            ))
            .into());
        }
        if self.hparams.hidden_dim == 0 {
            return Err(EvalError::invalid_config("hparams.hidden_dim must be > 0").into());
        }
        Ok(())
    }
}
