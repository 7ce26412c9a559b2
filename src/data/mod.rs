//! Test data
//!
//! - Batch / Sample: semantic-key containers for point clouds, flow and masks
//! - SyntheticScenes: seeded rigid-motion scenes
//! - SafetensorsFolder: one sample per safetensors file
//! - TestLoader: batched, in-order iteration over any sample source

mod batch;
mod directory;
mod synthetic;

pub use batch::{Batch, DatasetSpec, Sample, ViewPair};
pub use directory::SafetensorsFolder;
pub use synthetic::SyntheticScenes;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::{DatasetConfig, DatasetSource};

/// Random-access collection of samples
pub trait SampleSource {
    /// Number of samples
    fn len(&self) -> usize;

    /// Whether there are no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load sample `index`; `index < len()`
    fn get(&self, index: usize) -> Result<Sample>;
}

/// In-order batch iterator; the last batch may be short
pub struct TestLoader {
    source: Box<dyn SampleSource>,
    batch_size: usize,
    cursor: usize,
}

impl TestLoader {
    /// Wrap a sample source
    pub fn new(source: Box<dyn SampleSource>, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Build the loader a dataset config describes
    pub fn from_config(config: &DatasetConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let source: Box<dyn SampleSource> = match &config.source {
            DatasetSource::Synthetic(cfg) => {
                let pairs = config.view_pairs.iter().map(|&[i, j]| (i, j)).collect();
                Box::new(SyntheticScenes::new(cfg.clone(), pairs, seed))
            }
            DatasetSource::Directory { root } => Box::new(SafetensorsFolder::open(root)?),
        };
        if source.is_empty() {
            warn!("Test set is empty");
        }
        debug!(
            "Test loader: {} samples, batch size {}",
            source.len(),
            config.batch_size
        );
        Ok(Self::new(source, config.batch_size))
    }

    /// Total number of batches
    pub fn num_batches(&self) -> usize {
        self.source.len().div_ceil(self.batch_size)
    }

    /// Number of samples
    pub fn num_samples(&self) -> usize {
        self.source.len()
    }
}

impl Iterator for TestLoader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.source.len();
        if self.cursor >= total {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(total);
        let range = self.cursor..end;
        self.cursor = end;

        let batch = range
            .map(|i| self.source.get(i))
            .collect::<Result<Vec<_>>>()
            .and_then(|samples| Batch::collate(&samples));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.len().saturating_sub(self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}
