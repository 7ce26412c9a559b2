//! Scene-flow models
//!
//! Every estimator implements [`FlowModel`] and is registered by name so a
//! config file can select it:
//! - `zero_flow`: predicts no motion
//! - `nn_flow`: nearest neighbour in the target view
//! - `residual_mlp`: `nn_flow` refined by a point-wise MLP loaded from a checkpoint

mod nearest;
mod residual_mlp;
mod zero;

pub use nearest::NearestNeighborFlow;
pub use residual_mlp::ResidualMlp;
pub use zero::ZeroFlow;

use anyhow::Result;
use candle_core::{Device, Tensor};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{HyperParams, ModelConfig};
use crate::data::{Batch, TestLoader, ViewPair};
use crate::error::EvalError;
use crate::metrics::{average_records, flow_metrics, MetricRecord};

/// Predicted flow per (source view, target view), each `(B, N, 3)`
pub type TestResult = BTreeMap<ViewPair, Tensor>;

/// State shared by every model
#[derive(Debug, Clone)]
pub struct ModelBase {
    config: ModelConfig,
    hparams: HyperParams,
    device: Device,
}

impl ModelBase {
    /// Models start on the CPU; [`FlowModel::update_device`] moves them
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
            hparams: config.hparams.clone(),
            device: Device::Cpu,
        }
    }

    /// Config the model was built from
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Device the model currently lives on
    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Contract between the evaluation loop and a scene-flow estimator
pub trait FlowModel {
    /// Registered name
    fn name(&self) -> &'static str;

    /// Shared state
    fn base(&self) -> &ModelBase;

    /// Shared state, mutably
    fn base_mut(&mut self) -> &mut ModelBase;

    /// Predict flow from `pair.0` to `pair.1`, `(B, N, 3)`
    fn forward(&self, batch: &Batch, pair: ViewPair) -> Result<Tensor>;

    /// Hyperparameters, including the training-mode flag
    fn hparams(&self) -> &HyperParams {
        &self.base().hparams
    }

    /// Switch to inference mode
    fn eval(&mut self) {
        self.base_mut().hparams.is_training = false;
    }

    /// Device the model computes on
    fn device(&self) -> &Device {
        self.base().device()
    }

    /// Move the model to `device`; models with weights reload them there
    fn update_device(&mut self, device: &Device) -> Result<()> {
        self.base_mut().device = device.clone();
        Ok(())
    }

    /// Batched iterator over the configured test set
    fn test_dataloader(&self) -> Result<TestLoader> {
        let config = self.base().config();
        TestLoader::from_config(&config.dataset, config.seed)
    }

    /// Predict every configured view pair and score it against ground truth.
    ///
    /// Metrics of several pairs are averaged key by key.
    fn test_step(&self, batch: &Batch, batch_idx: usize) -> Result<(TestResult, MetricRecord)> {
        let config = self.base().config();
        let mut result = TestResult::new();
        let mut records = Vec::with_capacity(config.dataset.view_pairs.len());

        for &[i, j] in &config.dataset.view_pairs {
            let pair = (i, j);
            let flow = self.forward(batch, pair)?;
            records.push(flow_metrics(
                &flow,
                batch.flow(pair)?,
                batch.mask(pair)?,
                &config.metrics,
            )?);
            result.insert(pair, flow);
        }

        let metrics = average_records(&records);
        debug!(
            batch_idx,
            epe3d = metrics.get("epe3d-full").copied().unwrap_or(f64::NAN),
            "test step"
        );
        Ok((result, metrics))
    }
}

type Constructor = fn(&ModelConfig) -> Result<Box<dyn FlowModel>>;

const REGISTRY: &[(&str, Constructor)] = &[
    (ZeroFlow::NAME, ZeroFlow::boxed),
    (NearestNeighborFlow::NAME, NearestNeighborFlow::boxed),
    (ResidualMlp::NAME, ResidualMlp::boxed),
];

/// Names accepted in the `model` config field
pub fn available_models() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Construct the model `config.model` names
pub fn build(config: &ModelConfig) -> Result<Box<dyn FlowModel>> {
    let (_, constructor) = REGISTRY
        .iter()
        .find(|(name, _)| *name == config.model)
        .ok_or_else(|| EvalError::UnknownModel {
            name: config.model.clone(),
            available: available_models(),
        })?;
    constructor(config)
}
