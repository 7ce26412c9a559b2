//! Flow visualization
//!
//! For every predicted view pair the renderer draws, for the first sample of
//! the batch:
//! - the source cloud (red)
//! - the source cloud displaced by the predicted flow (green)
//! - the target cloud (blue)
//! - a line from every source point to its displaced position
//!
//! Rendering needs the `visualize` feature; without it [`renderer`] fails
//! with [`EvalError::VisualizationUnavailable`].

#[cfg(feature = "visualize")]
mod svg_render;

use anyhow::Result;
use std::path::Path;

use crate::data::{Batch, ViewPair};
use crate::models::TestResult;
#[cfg(not(feature = "visualize"))]
use crate::error::EvalError;

/// Source cloud, RGB in [0, 1]
pub const SOURCE_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
/// Source cloud displaced by the predicted flow
pub const DISPLACED_COLOR: [f32; 3] = [0.0, 1.0, 0.0];
/// Target cloud
pub const TARGET_COLOR: [f32; 3] = [0.0, 0.0, 1.0];

/// Consumes predictions as the evaluation loop produces them
pub trait FlowRenderer {
    /// Render the prediction for batch `batch_idx`
    fn render(&mut self, batch_idx: usize, result: &TestResult, batch: &Batch) -> Result<()>;
}

/// Geometry of one view pair, first batch element only
#[derive(Debug, Clone, PartialEq)]
pub struct FlowScene {
    /// (source view, target view)
    pub pair: ViewPair,
    /// Source points
    pub source: Vec<[f32; 3]>,
    /// Source points moved by the predicted flow
    pub displaced: Vec<[f32; 3]>,
    /// Target points
    pub target: Vec<[f32; 3]>,
}

impl FlowScene {
    /// Extract the scene of `pair` from a prediction and its batch
    pub fn extract(pair: ViewPair, result: &TestResult, batch: &Batch) -> Result<Self> {
        let flow = result
            .get(&pair)
            .ok_or_else(|| anyhow::anyhow!("No prediction for view pair {:?}", pair))?;

        let source = rows(&batch.pc(pair.0)?.get(0)?)?;
        let target = rows(&batch.pc(pair.1)?.get(0)?)?;
        let flow = rows(&flow.get(0)?)?;

        let displaced = source
            .iter()
            .zip(&flow)
            .map(|(p, f)| [p[0] + f[0], p[1] + f[1], p[2] + f[2]])
            .collect();

        Ok(Self {
            pair,
            source,
            displaced,
            target,
        })
    }

    /// Line segments (source point, displaced point)
    pub fn correspondences(&self) -> impl Iterator<Item = ([f32; 3], [f32; 3])> + '_ {
        self.source.iter().copied().zip(self.displaced.iter().copied())
    }

    /// Axis-aligned bounds over all three clouds, `(min, max)`
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for p in self.source.iter().chain(&self.displaced).chain(&self.target) {
            for c in 0..3 {
                lo[c] = lo[c].min(p[c]);
                hi[c] = hi[c].max(p[c]);
            }
        }
        (lo, hi)
    }
}

fn rows(t: &candle_core::Tensor) -> Result<Vec<[f32; 3]>> {
    let flat: Vec<f32> = t
        .to_dtype(candle_core::DType::F32)?
        .flatten_all()?
        .to_vec1()?;
    Ok(flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

/// The renderer compiled into this build, writing into `out_dir`
#[cfg(feature = "visualize")]
pub fn renderer(out_dir: &Path) -> Result<Box<dyn FlowRenderer>> {
    Ok(Box::new(svg_render::SvgRenderer::new(out_dir)?))
}

/// The renderer compiled into this build, writing into `out_dir`
#[cfg(not(feature = "visualize"))]
pub fn renderer(_out_dir: &Path) -> Result<Box<dyn FlowRenderer>> {
    Err(EvalError::VisualizationUnavailable.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};
    use std::collections::BTreeMap;

    fn batch_and_result() -> (Batch, TestResult) {
        let device = Device::Cpu;
        let pc0 = Tensor::new(&[[[0f32, 0., 0.], [1., 1., 1.]]], &device).unwrap();
        let pc1 = Tensor::new(&[[[0f32, 0., 1.], [1., 1., 2.]]], &device).unwrap();
        let flow = Tensor::new(&[[[0f32, 0., 0.5], [0., 0., 1.]]], &device).unwrap();
        let mask = Tensor::ones((1, 2), candle_core::DType::F32, &device).unwrap();

        let batch = Batch::new(
            vec![pc0, pc1],
            BTreeMap::from([((0, 1), flow.clone())]),
            BTreeMap::from([((0, 1), mask)]),
        );
        (batch, BTreeMap::from([((0, 1), flow)]))
    }

    #[test]
    fn test_extract_scene() {
        let (batch, result) = batch_and_result();
        let scene = FlowScene::extract((0, 1), &result, &batch).unwrap();
        assert_eq!(scene.displaced, vec![[0.0, 0.0, 0.5], [1.0, 1.0, 2.0]]);
        assert_eq!(scene.correspondences().count(), 2);

        let (lo, hi) = scene.bounds();
        assert_eq!(lo, [0.0, 0.0, 0.0]);
        assert_eq!(hi, [1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_extract_unknown_pair() {
        let (batch, result) = batch_and_result();
        assert!(FlowScene::extract((1, 0), &result, &batch).is_err());
    }

    #[cfg(not(feature = "visualize"))]
    #[test]
    fn test_renderer_unavailable_without_feature() {
        let err = renderer(Path::new("unused")).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::VisualizationUnavailable)
        ));
    }
}
