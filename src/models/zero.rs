//! Zero-motion baseline

use anyhow::Result;
use candle_core::Tensor;

use super::{FlowModel, ModelBase};
use crate::config::ModelConfig;
use crate::data::{Batch, ViewPair};

/// Predicts that nothing moves. Its EPE3D is the mean ground-truth flow
/// magnitude, a useful lower bound for any real estimator.
pub struct ZeroFlow {
    base: ModelBase,
}

impl ZeroFlow {
    /// Registered name
    pub const NAME: &'static str = "zero_flow";

    /// Model on the CPU
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            base: ModelBase::new(config),
        }
    }

    pub(super) fn boxed(config: &ModelConfig) -> Result<Box<dyn FlowModel>> {
        Ok(Box::new(Self::new(config)))
    }
}

impl FlowModel for ZeroFlow {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn forward(&self, batch: &Batch, pair: ViewPair) -> Result<Tensor> {
        Ok(batch.pc(pair.0)?.zeros_like()?)
    }
}
