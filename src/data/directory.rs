//! Samples stored as safetensors files
//!
//! Layout of one file:
//! - `pc{v}`: `(N, 3)` points of view `v`, views numbered from 0 without gaps
//! - `flow_{i}_{j}`: `(N, 3)` ground-truth flow from view `i` to view `j`
//! - `mask_{i}_{j}`: optional `(N,)` non-occlusion mask, all ones when absent

use anyhow::{Context, Result};
use candle_core::{safetensors, DType, Device, Tensor};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::batch::{Sample, ViewPair};
use super::SampleSource;
use crate::error::EvalError;

/// Sorted list of sample files under a root folder
pub struct SafetensorsFolder {
    files: Vec<PathBuf>,
}

impl SafetensorsFolder {
    /// Index every `*.safetensors` file directly under `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(root)
            .with_context(|| format!("Failed to read dataset directory: {:?}", root))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |e| e == "safetensors") {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(EvalError::invalid_config(format!(
                "no .safetensors samples found in {:?}",
                root
            ))
            .into());
        }
        debug!("Indexed {} samples under {:?}", files.len(), root);
        Ok(Self { files })
    }
}

impl SampleSource for SafetensorsFolder {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let path = &self.files[index];
        let tensors = safetensors::load(path, &Device::Cpu)
            .with_context(|| format!("Failed to load sample: {:?}", path))?;
        parse_sample(tensors).with_context(|| format!("Malformed sample: {:?}", path))
    }
}

fn parse_pair(name: &str, prefix: &str) -> Option<ViewPair> {
    let rest = name.strip_prefix(prefix)?;
    let (i, j) = rest.split_once('_')?;
    Some((i.parse().ok()?, j.parse().ok()?))
}

pub(crate) fn parse_sample(mut tensors: HashMap<String, Tensor>) -> Result<Sample> {
    let mut pcs = Vec::new();
    while let Some(pc) = tensors.remove(&format!("pc{}", pcs.len())) {
        pcs.push(pc.to_dtype(DType::F32)?);
    }
    if pcs.len() < 2 {
        return Err(EvalError::MissingKey {
            key: format!("pc{}", pcs.len()),
            context: "sample file".to_string(),
        }
        .into());
    }

    let mut flows = BTreeMap::new();
    for (name, tensor) in &tensors {
        if let Some(pair) = parse_pair(name, "flow_") {
            if pair.0 >= pcs.len() || pair.1 >= pcs.len() {
                return Err(EvalError::invalid_config(format!(
                    "{} refers to a view beyond pc{}",
                    name,
                    pcs.len() - 1
                ))
                .into());
            }
            flows.insert(pair, tensor.to_dtype(DType::F32)?);
        }
    }

    let mut masks = BTreeMap::new();
    for (&(i, j), flow) in &flows {
        let expected = pcs[i].dims().to_vec();
        if flow.dims() != expected.as_slice() {
            return Err(EvalError::ShapeMismatch {
                name: format!("flow_{}_{}", i, j),
                expected,
                got: flow.dims().to_vec(),
            }
            .into());
        }
        let n = flow.dim(0)?;
        let mask = match tensors.get(&format!("mask_{}_{}", i, j)) {
            Some(mask) => mask.to_dtype(DType::F32)?.reshape(n)?,
            None => Tensor::ones(n, DType::F32, &Device::Cpu)?,
        };
        masks.insert((i, j), mask);
    }

    Ok(Sample { pcs, flows, masks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sample(dir: &Path, name: &str, with_mask: bool) {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert("pc0".to_string(), Tensor::zeros((4, 3), DType::F32, &device).unwrap());
        tensors.insert("pc1".to_string(), Tensor::ones((4, 3), DType::F32, &device).unwrap());
        tensors.insert("flow_0_1".to_string(), Tensor::ones((4, 3), DType::F32, &device).unwrap());
        if with_mask {
            let mask = Tensor::new(&[1u8, 0, 1, 1], &device).unwrap();
            tensors.insert("mask_0_1".to_string(), mask);
        }
        safetensors::save(&tensors, dir.join(name)).unwrap();
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("flow_0_1", "flow_"), Some((0, 1)));
        assert_eq!(parse_pair("flow_12_3", "flow_"), Some((12, 3)));
        assert_eq!(parse_pair("flow_a_1", "flow_"), None);
        assert_eq!(parse_pair("mask_0_1", "flow_"), None);
    }

    #[test]
    fn test_folder_is_sorted_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "b.safetensors", true);
        write_sample(dir.path(), "a.safetensors", false);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let folder = SafetensorsFolder::open(dir.path()).unwrap();
        assert_eq!(folder.len(), 2);

        let first = folder.get(0).unwrap();
        let mask: Vec<f32> = first.masks[&(0, 1)].to_vec1().unwrap();
        assert_eq!(mask, vec![1.0; 4]);

        let second = folder.get(1).unwrap();
        let mask: Vec<f32> = second.masks[&(0, 1)].to_vec1().unwrap();
        assert_eq!(mask, vec![1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_empty_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SafetensorsFolder::open(dir.path()).is_err());
    }

    #[test]
    fn test_single_view_is_rejected() {
        let mut tensors = HashMap::new();
        tensors.insert(
            "pc0".to_string(),
            Tensor::zeros((4, 3), DType::F32, &Device::Cpu).unwrap(),
        );
        let err = parse_sample(tensors).unwrap_err();
        assert!(err.to_string().contains("pc1"));
    }
}
