//! Fixed-format metric table

use anyhow::Result;
use std::fmt::Write;

use crate::error::EvalError;
use crate::metrics::flow::{ACC3D_RELAX, ACC3D_STRICT, EPE3D, FULL_SUFFIX, OUTLIER};
use crate::metrics::{MeanStd, MetricSummary};

/// (label, metric, decimals)
const ROWS: [(&str, &str, usize); 4] = [
    ("EPE3D: ", EPE3D, 2),
    ("AccS (%): ", ACC3D_STRICT, 1),
    ("AccR (%): ", ACC3D_RELAX, 1),
    ("Outlier: ", OUTLIER, 1),
];

fn lookup<'a>(summary: &'a MetricSummary, name: &str) -> Result<&'a MeanStd> {
    summary.get(name).ok_or_else(|| {
        EvalError::MissingKey {
            key: name.to_string(),
            context: "metric summary".to_string(),
        }
        .into()
    })
}

/// Render the non-occluded and full metric groups, values scaled by 100
pub fn format_summary(summary: &MetricSummary) -> Result<String> {
    let mut out = String::from("Test metrics:\n");
    for (title, suffix) in [("Non-occluded", ""), ("Full", FULL_SUFFIX)] {
        writeln!(out, "+ {}:", title)?;
        for (label, metric, decimals) in ROWS {
            let stats = lookup(summary, &format!("{}{}", metric, suffix))?;
            writeln!(
                out,
                "  + {}\t {:.prec$}\t+/-\t{:.prec$}",
                label,
                stats.mean * 100.0,
                stats.std * 100.0,
                prec = decimals
            )?;
        }
    }
    Ok(out)
}
