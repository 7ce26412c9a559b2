//! Evaluation metrics
//!
//! - AverageMeter: mean / population std across batches
//! - flow: EPE3D, AccS, AccR and Outlier on non-occluded and full point sets

pub mod flow;
mod meter;

pub use flow::{average_records, flow_metrics, metric_names};
pub use meter::{AverageMeter, MeanStd, MetricRecord, MetricSummary};
