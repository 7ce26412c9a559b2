//! Test-set evaluation loop
//!
//! For every batch of the model's test loader:
//! 1. copy the batch to the target device
//! 2. run the model's test step
//! 3. hand the prediction to the renderer, if any
//! 4. record the batch metrics

use anyhow::{Context, Result};
use candle_core::Device;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::EvalError;
use crate::metrics::AverageMeter;
use crate::models::FlowModel;
use crate::visualize::FlowRenderer;

/// Runs a model over its test set
pub struct Evaluator {
    device: Device,
    renderer: Option<Box<dyn FlowRenderer>>,
    stop_flag: Option<Arc<AtomicBool>>,
    show_progress: bool,
}

impl Evaluator {
    /// Evaluate on `device` without rendering
    pub fn new(device: Device) -> Self {
        Self {
            device,
            renderer: None,
            stop_flag: None,
            show_progress: true,
        }
    }

    /// Render every prediction with `renderer`
    pub fn with_renderer(mut self, renderer: Box<dyn FlowRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Stop between batches once `flag` is raised
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Show or hide the progress bar
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} {bar:40.green/blue} {pos}/{len} [{elapsed_precise}<{eta_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message("Test");
        pb
    }

    /// Put the model in inference mode and run it over every test batch.
    ///
    /// Returns [`EvalError::Interrupted`] when the stop flag is raised.
    pub fn run(&mut self, model: &mut dyn FlowModel) -> Result<AverageMeter> {
        model.eval();

        let loader = model.test_dataloader()?;
        info!(
            "Evaluating {} on {} samples ({} batches)",
            model.name(),
            loader.num_samples(),
            loader.num_batches()
        );

        let pb = self.progress_bar(loader.num_batches());
        let mut meter = AverageMeter::new();

        for (batch_idx, batch) in loader.enumerate() {
            if self.stop_requested() {
                pb.abandon();
                return Err(EvalError::Interrupted.into());
            }

            let batch = batch
                .with_context(|| format!("Failed to load test batch {}", batch_idx))?
                .to_device(&self.device)?;
            if batch_idx == 0 {
                debug!("batch keys: {:?}", batch.keys());
            }
            let (result, metrics) = model.test_step(&batch, batch_idx)?;

            if let Some(renderer) = self.renderer.as_mut() {
                pb.suspend(|| renderer.render(batch_idx, &result, &batch))?;
            }

            debug!("batch {}: {:?}", batch_idx, metrics);
            meter.append(&metrics);
            pb.inc(1);
        }

        pb.finish();
        Ok(meter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::data::Batch;
    use crate::models::{self, TestResult};

    /// Raises the stop flag while rendering the first batch
    struct StopAfterFirst {
        flag: Arc<AtomicBool>,
        rendered: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    impl FlowRenderer for StopAfterFirst {
        fn render(&mut self, batch_idx: usize, _: &TestResult, _: &Batch) -> Result<()> {
            self.rendered.lock().unwrap().push(batch_idx);
            self.flag.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn config() -> ModelConfig {
        ModelConfig::from_yaml(
            "model: zero_flow\ndataset:\n    batch_size: 1\n    source:\n        kind: synthetic\n        num_samples: 3\n        num_points: 8\n",
        )
        .unwrap()
    }

    #[test]
    fn test_one_observation_per_batch() {
        let mut model = models::build(&config()).unwrap();
        let meter = Evaluator::new(Device::Cpu)
            .with_progress(false)
            .run(model.as_mut())
            .unwrap();
        assert_eq!(meter.count("epe3d-full"), 3);
        assert!(!model.hparams().is_training);
    }

    #[test]
    fn test_raised_stop_flag_interrupts() {
        let mut model = models::build(&config()).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let err = Evaluator::new(Device::Cpu)
            .with_progress(false)
            .with_stop_flag(flag)
            .run(model.as_mut())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::Interrupted)
        ));
    }

    #[test]
    fn test_stop_flag_raised_mid_run_discards_partial_results() {
        let mut model = models::build(&config()).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let rendered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let result = Evaluator::new(Device::Cpu)
            .with_progress(false)
            .with_stop_flag(Arc::clone(&flag))
            .with_renderer(Box::new(StopAfterFirst {
                flag: Arc::clone(&flag),
                rendered: Arc::clone(&rendered),
            }))
            .run(model.as_mut());

        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::Interrupted)
        ));
        assert_eq!(*rendered.lock().unwrap(), vec![0]);
    }
}
