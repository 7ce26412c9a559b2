//! Running mean / std over named scalar metrics

use serde::Serialize;
use std::collections::BTreeMap;

/// One observation per metric name
pub type MetricRecord = BTreeMap<String, f64>;

/// Per metric name: mean, population std and observation count
pub type MetricSummary = BTreeMap<String, MeanStd>;

/// Aggregate of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStd {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Number of observations
    pub count: usize,
}

/// Accumulates metric records across batches.
///
/// Names reported only by some batches are averaged over the batches that
/// reported them.
#[derive(Debug, Clone, Default)]
pub struct AverageMeter {
    observations: BTreeMap<String, Vec<f64>>,
}

impl AverageMeter {
    /// Empty meter
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation for every metric in `record`
    pub fn append(&mut self, record: &MetricRecord) {
        for (name, &value) in record {
            self.observations
                .entry(name.clone())
                .or_default()
                .push(value);
        }
    }

    /// Observations recorded for `name`
    pub fn count(&self, name: &str) -> usize {
        self.observations.get(name).map_or(0, Vec::len)
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Mean and population standard deviation per metric
    pub fn summary(&self) -> MetricSummary {
        self.observations
            .iter()
            .map(|(name, values)| (name.clone(), mean_std(values)))
            .collect()
    }

    /// Flattened summary with `<name>-avg` and `<name>-std` keys
    pub fn mean_dict(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (name, stats) in self.summary() {
            out.insert(format!("{}-avg", name), stats.mean);
            out.insert(format!("{}-std", name), stats.std);
        }
        out
    }
}

fn mean_std(values: &[f64]) -> MeanStd {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    MeanStd {
        mean,
        std: var.sqrt(),
        count: values.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, f64)]) -> MetricRecord {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_population_std() {
        let mut meter = AverageMeter::new();
        for v in [1.0, 2.0, 3.0] {
            meter.append(&record(&[("epe3d", v)]));
        }
        let stats = meter.summary()["epe3d"];
        assert_eq!(stats.mean, 2.0);
        assert!((stats.std - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((stats.std - 0.816).abs() < 1e-3);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn test_single_observation_has_zero_std() {
        let mut meter = AverageMeter::new();
        meter.append(&record(&[("outlier", 0.25)]));
        assert_eq!(meter.summary()["outlier"].std, 0.0);
    }

    #[test]
    fn test_partial_metrics_use_their_own_count() {
        let mut meter = AverageMeter::new();
        meter.append(&record(&[("epe3d", 1.0), ("epe3d-full", 2.0)]));
        meter.append(&record(&[("epe3d-full", 4.0)]));

        assert_eq!(meter.count("epe3d"), 1);
        assert_eq!(meter.count("epe3d-full"), 2);
        assert_eq!(meter.summary()["epe3d-full"].mean, 3.0);
    }

    #[test]
    fn test_mean_dict_keys() {
        let mut meter = AverageMeter::new();
        assert!(meter.is_empty());
        meter.append(&record(&[("acc3d_strict", 0.5)]));
        let dict = meter.mean_dict();
        assert_eq!(
            dict.keys().cloned().collect::<Vec<_>>(),
            vec!["acc3d_strict-avg".to_string(), "acc3d_strict-std".to_string()]
        );
        assert_eq!(dict["acc3d_strict-avg"], 0.5);
    }
}
