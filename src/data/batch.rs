//! Samples and batches
//!
//! A sample is one multi-view scene; a batch stacks `B` samples along a
//! new leading dimension.

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use std::collections::BTreeMap;

use crate::error::EvalError;

/// (source view, target view)
pub type ViewPair = (usize, usize);

/// Semantic keys a batch carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetSpec {
    /// Point cloud per view, `(B, N, 3)`
    Pc,
    /// Ground-truth flow per view pair, `(B, N, 3)`
    FullFlow,
    /// Non-occlusion mask per view pair, `(B, N)`, 1.0 = visible in both views
    FullMask,
}

impl DatasetSpec {
    /// Every key, in canonical order
    pub const ALL: [DatasetSpec; 3] = [Self::Pc, Self::FullFlow, Self::FullMask];

    /// Key name as used in logs and sample files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pc => "pc",
            Self::FullFlow => "flow",
            Self::FullMask => "mask",
        }
    }
}

/// One multi-view scene, unbatched
#[derive(Debug, Clone)]
pub struct Sample {
    /// `(N, 3)` per view
    pub pcs: Vec<Tensor>,
    /// `(N, 3)` per view pair
    pub flows: BTreeMap<ViewPair, Tensor>,
    /// `(N,)` per view pair
    pub masks: BTreeMap<ViewPair, Tensor>,
}

/// A collated batch of samples
#[derive(Debug, Clone)]
pub struct Batch {
    pcs: Vec<Tensor>,
    flows: BTreeMap<ViewPair, Tensor>,
    masks: BTreeMap<ViewPair, Tensor>,
}

impl Batch {
    /// Build a batch from already-stacked tensors
    pub fn new(
        pcs: Vec<Tensor>,
        flows: BTreeMap<ViewPair, Tensor>,
        masks: BTreeMap<ViewPair, Tensor>,
    ) -> Self {
        Self { pcs, flows, masks }
    }

    /// Stack samples along a new batch dimension.
    ///
    /// Every sample must carry the same views and view pairs with equal
    /// point counts.
    pub fn collate(samples: &[Sample]) -> Result<Self> {
        let first = samples
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot collate an empty batch"))?;

        let mut pcs = Vec::with_capacity(first.pcs.len());
        for view in 0..first.pcs.len() {
            let parts = samples
                .iter()
                .map(|s| {
                    s.pcs.get(view).ok_or_else(|| EvalError::MissingKey {
                        key: format!("pc{}", view),
                        context: "sample".to_string(),
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            pcs.push(stack_checked(&parts, &format!("pc{}", view))?);
        }

        let mut flows = BTreeMap::new();
        let mut masks = BTreeMap::new();
        for &pair in first.flows.keys() {
            let flow_parts = samples
                .iter()
                .map(|s| lookup(&s.flows, pair, DatasetSpec::FullFlow, "sample"))
                .collect::<Result<Vec<_>>>()?;
            let mask_parts = samples
                .iter()
                .map(|s| lookup(&s.masks, pair, DatasetSpec::FullMask, "sample"))
                .collect::<Result<Vec<_>>>()?;

            let name = format!("{}_{}", pair.0, pair.1);
            flows.insert(pair, stack_checked(&flow_parts, &format!("flow_{}", name))?);
            masks.insert(pair, stack_checked(&mask_parts, &format!("mask_{}", name))?);
        }

        Ok(Self { pcs, flows, masks })
    }

    /// Number of samples in the batch
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.pc(0)?.dim(0)?)
    }

    /// Number of views
    pub fn num_views(&self) -> usize {
        self.pcs.len()
    }

    /// Keys present in this batch
    pub fn keys(&self) -> Vec<DatasetSpec> {
        DatasetSpec::ALL
            .into_iter()
            .filter(|key| match key {
                DatasetSpec::Pc => !self.pcs.is_empty(),
                DatasetSpec::FullFlow => !self.flows.is_empty(),
                DatasetSpec::FullMask => !self.masks.is_empty(),
            })
            .collect()
    }

    /// View pairs with ground truth
    pub fn view_pairs(&self) -> impl Iterator<Item = ViewPair> + '_ {
        self.flows.keys().copied()
    }

    /// Point cloud of `view`, `(B, N, 3)`
    pub fn pc(&self, view: usize) -> Result<&Tensor> {
        self.pcs.get(view).ok_or_else(|| {
            EvalError::MissingKey {
                key: format!("{}{}", DatasetSpec::Pc.as_str(), view),
                context: "batch".to_string(),
            }
            .into()
        })
    }

    /// Ground-truth flow of `pair`, `(B, N, 3)`
    pub fn flow(&self, pair: ViewPair) -> Result<&Tensor> {
        lookup(&self.flows, pair, DatasetSpec::FullFlow, "batch")
    }

    /// Non-occlusion mask of `pair`, `(B, N)`
    pub fn mask(&self, pair: ViewPair) -> Result<&Tensor> {
        lookup(&self.masks, pair, DatasetSpec::FullMask, "batch")
    }

    /// Copy every tensor to `device`
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        let pcs = self
            .pcs
            .iter()
            .map(|t| t.to_device(device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let flows = move_map(&self.flows, device)?;
        let masks = move_map(&self.masks, device)?;
        Ok(Self { pcs, flows, masks })
    }
}

fn lookup<'a>(
    map: &'a BTreeMap<ViewPair, Tensor>,
    pair: ViewPair,
    key: DatasetSpec,
    context: &str,
) -> Result<&'a Tensor> {
    map.get(&pair).ok_or_else(|| {
        EvalError::MissingKey {
            key: format!("{}_{}_{}", key.as_str(), pair.0, pair.1),
            context: context.to_string(),
        }
        .into()
    })
}

fn move_map(
    map: &BTreeMap<ViewPair, Tensor>,
    device: &Device,
) -> Result<BTreeMap<ViewPair, Tensor>> {
    map.iter()
        .map(|(&pair, t)| Ok((pair, t.to_device(device)?)))
        .collect()
}

fn stack_checked(parts: &[&Tensor], name: &str) -> Result<Tensor> {
    let expected = parts[0].dims().to_vec();
    for part in &parts[1..] {
        if part.dims() != expected.as_slice() {
            return Err(EvalError::ShapeMismatch {
                name: name.to_string(),
                expected,
                got: part.dims().to_vec(),
            }
            .into());
        }
    }
    Tensor::stack(parts, 0).with_context(|| format!("Failed to stack {}", name))
}
