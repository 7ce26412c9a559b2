//! Evaluation driver
//!
//! - Evaluator: batch loop with progress, rendering and interruption
//! - format_summary: the printed metric table
//! - evaluate: config -> model -> device -> loop, in one call

mod evaluator;
mod report;

pub use evaluator::Evaluator;
pub use report::format_summary;

use anyhow::Result;
use candle_core::Device;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

use crate::config::ModelConfig;
use crate::metrics::AverageMeter;
use crate::models;
use crate::visualize::FlowRenderer;

/// Runtime options that are not part of the model config
pub struct EvalOptions {
    /// Device to evaluate on
    pub device: Device,
    /// Called with every batch prediction when set
    pub renderer: Option<Box<dyn FlowRenderer>>,
    /// Raised to stop before the next batch
    pub stop_flag: Option<Arc<AtomicBool>>,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            renderer: None,
            stop_flag: None,
            show_progress: true,
        }
    }
}

/// Build the configured model, move it to the target device and evaluate it
pub fn evaluate(config: &ModelConfig, options: EvalOptions) -> Result<AverageMeter> {
    config.validate()?;
    info!("Building model '{}' (seed {})", config.model, config.seed);
    let mut model = models::build(config)?;
    model.update_device(&options.device)?;

    let mut evaluator = Evaluator::new(options.device).with_progress(options.show_progress);
    if let Some(renderer) = options.renderer {
        evaluator = evaluator.with_renderer(renderer);
    }
    if let Some(flag) = options.stop_flag {
        evaluator = evaluator.with_stop_flag(flag);
    }
    evaluator.run(model.as_mut())
}
