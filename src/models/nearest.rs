//! Nearest-neighbour flow

use anyhow::Result;
use candle_core::Tensor;

use super::{FlowModel, ModelBase};
use crate::config::ModelConfig;
use crate::data::{Batch, ViewPair};
use crate::utils::tensor_utils::nearest_neighbor_flow;

/// Moves every source point onto its closest target point.
///
/// Exact for static scenes sampled at the same points; degrades with
/// sensor noise, occlusion and large motion.
pub struct NearestNeighborFlow {
    base: ModelBase,
}

impl NearestNeighborFlow {
    /// Registered name
    pub const NAME: &'static str = "nn_flow";

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

impl FlowModel for NearestNeighborFlow {
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
        Ok(nearest_neighbor_flow(batch.pc(pair.0)?, batch.pc(pair.1)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetSource, SyntheticConfig};

    #[test]
    fn test_exact_on_noise_free_translation() {
        let mut config = ModelConfig::from_yaml(
            "model: nn_flow\ndataset:\n    source:\n        kind: synthetic\n",
        )
        .unwrap();
        // a sparse cloud moved by a few centimetres: every nearest neighbour is the true match
        config.dataset.source = DatasetSource::Synthetic(SyntheticConfig {
            num_samples: 1,
            num_points: 16,
            max_rotation_deg: 0.0,
            max_translation: 0.01,
            occlusion_ratio: 0.0,
            ..SyntheticConfig::default()
        });

        let model = NearestNeighborFlow::new(&config);
        let batch = model.test_dataloader().unwrap().next().unwrap().unwrap();
        let (_, metrics) = model.test_step(&batch, 0).unwrap();
        assert!(metrics["epe3d"] < 1e-5);
        assert_eq!(metrics["acc3d_strict"], 1.0);
    }
}
