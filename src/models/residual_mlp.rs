//! Nearest-neighbour flow refined by a point-wise MLP
//!
//! Each source point is described by its position and its nearest-neighbour
//! offset `[x, y, z, dx, dy, dz]`. A stack of ReLU linear layers maps that to
//! a residual added to the offset.
//!
//! Checkpoint tensor names:
//! - `head.{l}.weight` / `head.{l}.bias` for hidden layer `l`
//! - `head.out.weight` / `head.out.bias` for the output layer

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use tracing::{info, warn};

use super::{FlowModel, ModelBase};
use crate::config::ModelConfig;
use crate::data::{Batch, ViewPair};
use crate::utils::tensor_utils::nearest_neighbor_flow;

const INPUT_DIM: usize = 6;
const OUTPUT_DIM: usize = 3;

/// Learned refinement on top of `nn_flow`
pub struct ResidualMlp {
    base: ModelBase,
    hidden: Vec<Linear>,
    output: Linear,
}

impl ResidualMlp {
    /// Registered name
    pub const NAME: &'static str = "residual_mlp";

    /// Build the head on the CPU and load its weights
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let base = ModelBase::new(config);
        let (hidden, output) = Self::load_head(config, base.device())?;
        Ok(Self {
            base,
            hidden,
            output,
        })
    }

    pub(super) fn boxed(config: &ModelConfig) -> Result<Box<dyn FlowModel>> {
        Ok(Box::new(Self::new(config)?))
    }

    /// Load the head from the checkpoint, or zero it when there is none
    fn load_head(config: &ModelConfig, device: &Device) -> Result<(Vec<Linear>, Linear)> {
        let vb = match &config.checkpoint {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Checkpoint not found: {:?}", path);
                }
                info!("Loading residual head from {:?}", path);
                unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? }
            }
            None => {
                warn!("No checkpoint configured, residual head is zero (equivalent to nn_flow)");
                VarBuilder::zeros(DType::F32, device)
            }
        };
        Self::build_head(config, vb).context("Failed to build residual head")
    }

    fn build_head(config: &ModelConfig, vb: VarBuilder) -> Result<(Vec<Linear>, Linear)> {
        let hp = &config.hparams;
        let vb = vb.pp("head");

        let mut hidden = Vec::with_capacity(hp.num_layers);
        let mut in_dim = INPUT_DIM;
        for l in 0..hp.num_layers {
            hidden.push(candle_nn::linear(in_dim, hp.hidden_dim, vb.pp(l.to_string()))?);
            in_dim = hp.hidden_dim;
        }
        let output = candle_nn::linear(in_dim, OUTPUT_DIM, vb.pp("out"))?;
        Ok((hidden, output))
    }

    /// Residual for features `(B, N, 6)` -> `(B, N, 3)`
    fn head_forward(&self, features: &Tensor) -> Result<Tensor> {
        let mut x = features.clone();
        for layer in &self.hidden {
            x = layer.forward(&x)?.relu()?;
        }
        Ok(self.output.forward(&x)?)
    }
}

impl FlowModel for ResidualMlp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn update_device(&mut self, device: &Device) -> Result<()> {
        if device.same_device(self.base.device()) {
            return Ok(());
        }
        let (hidden, output) = Self::load_head(self.base.config(), device)?;
        self.hidden = hidden;
        self.output = output;
        self.base.device = device.clone();
        Ok(())
    }

    fn forward(&self, batch: &Batch, pair: ViewPair) -> Result<Tensor> {
        let src = batch.pc(pair.0)?;
        let coarse = nearest_neighbor_flow(src, batch.pc(pair.1)?)?;
        let features = Tensor::cat(&[src, &coarse], D::Minus1)?;
        let residual = self.head_forward(&features)?;
        Ok((coarse + residual)?)
    }
}
