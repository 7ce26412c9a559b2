//! Scene-flow error metrics
//!
//! Per point: `e = |pred - gt|`, `r = e / (|gt| + 1e-4)`.
//! - EPE3D: mean `e`
//! - AccS: share of points with `e < strict` or `r < strict`
//! - AccR: share of points with `e < relax` or `r < relax`
//! - Outlier: share of points with `e > outlier` or `r > relax`
//!
//! Each metric is reported over non-occluded points (plain name) and over
//! all points (`-full` suffix).

use anyhow::Result;
use candle_core::{DType, Tensor};

use super::meter::{AverageMeter, MetricRecord};
use crate::config::MetricThresholds;
use crate::error::EvalError;

/// Mean end-point error (meters)
pub const EPE3D: &str = "epe3d";
/// Fraction of points within the strict threshold
pub const ACC3D_STRICT: &str = "acc3d_strict";
/// Fraction of points within the relaxed threshold
pub const ACC3D_RELAX: &str = "acc3d_relax";
/// Fraction of points beyond the outlier threshold
pub const OUTLIER: &str = "outlier";

/// Suffix of metrics computed over every point
pub const FULL_SUFFIX: &str = "-full";

/// The four base metric names
pub const BASE_METRICS: [&str; 4] = [EPE3D, ACC3D_STRICT, ACC3D_RELAX, OUTLIER];

/// Every metric name a flow test step reports
pub fn metric_names() -> Vec<String> {
    BASE_METRICS
        .iter()
        .map(|m| m.to_string())
        .chain(BASE_METRICS.iter().map(|m| format!("{}{}", m, FULL_SUFFIX)))
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    points: usize,
    epe_sum: f64,
    strict: usize,
    relax: usize,
    outliers: usize,
}

impl Tally {
    fn add(&mut self, err: f32, rel: f32, t: &MetricThresholds) {
        self.points += 1;
        self.epe_sum += err as f64;
        if err < t.strict_threshold || rel < t.strict_threshold {
            self.strict += 1;
        }
        if err < t.relax_threshold || rel < t.relax_threshold {
            self.relax += 1;
        }
        if err > t.outlier_threshold || rel > t.relax_threshold {
            self.outliers += 1;
        }
    }

    fn write(&self, record: &mut MetricRecord, suffix: &str) {
        if self.points == 0 {
            return;
        }
        let n = self.points as f64;
        record.insert(format!("{}{}", EPE3D, suffix), self.epe_sum / n);
        record.insert(format!("{}{}", ACC3D_STRICT, suffix), self.strict as f64 / n);
        record.insert(format!("{}{}", ACC3D_RELAX, suffix), self.relax as f64 / n);
        record.insert(format!("{}{}", OUTLIER, suffix), self.outliers as f64 / n);
    }
}

/// Metrics of one predicted flow field.
///
/// `pred`, `gt`: `(B, N, 3)`; `mask`: `(B, N)`, non-zero = non-occluded.
/// If no point is non-occluded only the `-full` metrics are reported.
pub fn flow_metrics(
    pred: &Tensor,
    gt: &Tensor,
    mask: &Tensor,
    thresholds: &MetricThresholds,
) -> Result<MetricRecord> {
    if pred.dims() != gt.dims() {
        return Err(EvalError::ShapeMismatch {
            name: "predicted flow".to_string(),
            expected: gt.dims().to_vec(),
            got: pred.dims().to_vec(),
        }
        .into());
    }
    let (b, n, _) = gt.dims3()?;
    if mask.dims() != [b, n] {
        return Err(EvalError::ShapeMismatch {
            name: "flow mask".to_string(),
            expected: vec![b, n],
            got: mask.dims().to_vec(),
        }
        .into());
    }

    let pred: Vec<f32> = pred.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
    let gt: Vec<f32> = gt.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
    let mask: Vec<f32> = mask.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;

    let mut full = Tally::default();
    let mut visible = Tally::default();
    for ((p, g), &m) in pred.chunks_exact(3).zip(gt.chunks_exact(3)).zip(&mask) {
        let err = norm3(p[0] - g[0], p[1] - g[1], p[2] - g[2]);
        let rel = err / (norm3(g[0], g[1], g[2]) + 1e-4);
        full.add(err, rel, thresholds);
        if m != 0.0 {
            visible.add(err, rel, thresholds);
        }
    }

    let mut record = MetricRecord::new();
    visible.write(&mut record, "");
    full.write(&mut record, FULL_SUFFIX);
    Ok(record)
}

/// Average several records key by key
pub fn average_records(records: &[MetricRecord]) -> MetricRecord {
    let mut meter = AverageMeter::new();
    for record in records {
        meter.append(record);
    }
    meter
        .summary()
        .into_iter()
        .map(|(name, stats)| (name, stats.mean))
        .collect()
}

fn norm3(x: f32, y: f32, z: f32) -> f32 {
    (x * x + y * y + z * z).sqrt()
}
