//! # sceneflow-eval
//!
//! Evaluation driver for point-cloud scene-flow estimators.
//!
//! ## Features
//!
//! - Config-selected estimators behind one [`FlowModel`] trait
//! - Synthetic and safetensors-backed test sets
//! - EPE3D, strict / relaxed accuracy and outlier rate on non-occluded and
//!   full point sets, aggregated as mean ± population std
//! - Optional SVG rendering of predicted correspondences (`visualize` feature)
//! - CPU or CUDA execution via Candle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sceneflow_eval::{evaluate, format_summary, EvalOptions, ModelConfig};
//!
//! let config = ModelConfig::load("configs/nn_flow.yaml")?;
//! let meter = evaluate(&config, EvalOptions::default())?;
//! println!("{}", format_summary(&meter.summary())?);
//! ```

// Require docs for public items
#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod metrics;
pub mod models;
pub mod utils;
pub mod visualize;

// Re-exports for convenience
pub use config::ModelConfig;
pub use error::EvalError;
pub use eval::{evaluate, format_summary, EvalOptions, Evaluator};
pub use metrics::{AverageMeter, MetricRecord, MetricSummary};
pub use models::{FlowModel, TestResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
