//! Integration tests for sceneflow-eval
//!
//! Runs the full config -> model -> loop -> summary path on small test sets.

use anyhow::Result;
use candle_core::{safetensors, DType, Device, Tensor};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use sceneflow_eval::data::Batch;
use sceneflow_eval::metrics::metric_names;
use sceneflow_eval::models::{self, TestResult};
use sceneflow_eval::visualize::{FlowRenderer, FlowScene};
use sceneflow_eval::{evaluate, format_summary, EvalError, EvalOptions, Evaluator, ModelConfig};

const TWO_BATCHES: &str = r#"
model: nn_flow
seed: 0
dataset:
    batch_size: 2
    view_pairs: [[0, 1], [1, 0]]
    source:
        kind: synthetic
        num_samples: 4
        num_points: 64
        occlusion_ratio: 0.2
        noise_std: 0.01
"#;

fn quiet() -> EvalOptions {
    EvalOptions {
        show_progress: false,
        ..EvalOptions::default()
    }
}

/// Counts how often it is called and checks every scene it gets
struct CountingRenderer {
    calls: Rc<RefCell<Vec<usize>>>,
}

impl FlowRenderer for CountingRenderer {
    fn render(&mut self, batch_idx: usize, result: &TestResult, batch: &Batch) -> Result<()> {
        for &pair in result.keys() {
            let scene = FlowScene::extract(pair, result, batch)?;
            assert_eq!(scene.source.len(), scene.displaced.len());
        }
        self.calls.borrow_mut().push(batch_idx);
        Ok(())
    }
}

/// Test that a two-batch run reports exactly the eight flow metrics
#[test]
fn test_two_batch_summary_keys() {
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let meter = evaluate(&config, quiet()).unwrap();
    let summary = meter.summary();

    let mut keys: Vec<String> = summary.keys().cloned().collect();
    let mut expected = metric_names();
    keys.sort();
    expected.sort();
    assert_eq!(keys, expected);
    for stats in summary.values() {
        assert_eq!(stats.count, 2);
        assert!(stats.mean.is_finite() && stats.std >= 0.0);
    }

    let table = format_summary(&summary).unwrap();
    assert_eq!(table.lines().count(), 11);
}

/// Test that runs with the same seed agree
#[test]
fn test_runs_are_reproducible() {
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let a = evaluate(&config, quiet()).unwrap().mean_dict();
    let b = evaluate(&config, quiet()).unwrap().mean_dict();
    assert_eq!(a, b);
}

/// Test that the configuration is left untouched by a run
#[test]
fn test_config_not_mutated() {
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let before = config.clone();

    let mut model = models::build(&config).unwrap();
    Evaluator::new(Device::Cpu)
        .with_progress(false)
        .run(model.as_mut())
        .unwrap();

    assert!(!model.hparams().is_training);
    assert_eq!(config, before);
    assert!(config.hparams.is_training);
}

/// Test that the renderer sees every batch when enabled
#[test]
fn test_renderer_called_per_batch() {
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let options = EvalOptions {
        renderer: Some(Box::new(CountingRenderer {
            calls: Rc::clone(&calls),
        })),
        ..quiet()
    };
    evaluate(&config, options).unwrap();
    assert_eq!(*calls.borrow(), vec![0, 1]);
}

/// Test that without a renderer the run succeeds whether or not one is compiled in
#[test]
fn test_no_visualize_never_renders() {
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let options = EvalOptions {
        renderer: None,
        ..quiet()
    };
    assert!(evaluate(&config, options).is_ok());
}

/// Test that requesting a renderer in a build without one is a handled error
#[cfg(not(feature = "visualize"))]
#[test]
fn test_visualize_unavailable() {
    use sceneflow_eval::visualize;

    let err = visualize::renderer(Path::new("flow_vis")).err().unwrap();
    let err = err.downcast::<EvalError>().unwrap();
    assert!(matches!(err, EvalError::VisualizationUnavailable));
    assert!(!err.is_quiet_exit());
}

/// Test that the SVG renderer writes one file per batch and pair
#[cfg(feature = "visualize")]
#[test]
fn test_svg_files_written() {
    use sceneflow_eval::visualize;

    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let options = EvalOptions {
        renderer: Some(visualize::renderer(dir.path()).unwrap()),
        ..quiet()
    };
    evaluate(&config, options).unwrap();
    assert!(dir.path().join("batch0000_view0_to_1.svg").exists());
    assert!(dir.path().join("batch0001_view1_to_0.svg").exists());
}

fn assert_invalid_config(yaml: &str) {
    let config = ModelConfig::from_yaml(yaml).unwrap();
    let err = evaluate(&config, quiet()).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<EvalError>(),
        Some(EvalError::InvalidConfig { .. })
    ));
}

/// Test that a parsed but unusable config is reported, not evaluated
#[test]
fn test_evaluate_rejects_unvalidated_config() {
    assert_invalid_config(&TWO_BATCHES.replace("[[0, 1], [1, 0]]", "[[0, 2]]"));
    assert_invalid_config(&format!("{}        extent: -1.0\n", TWO_BATCHES));
}

/// Test that the zero baseline scores worse than nearest neighbour on moving scenes
#[test]
fn test_baselines_rank() {
    let mut config = ModelConfig::from_yaml(TWO_BATCHES).unwrap();
    let nn = evaluate(&config, quiet()).unwrap().summary();
    config.model = "zero_flow".to_string();
    let zero = evaluate(&config, quiet()).unwrap().summary();

    assert!(nn["epe3d"].mean < zero["epe3d"].mean);
}

fn write_sample(dir: &Path, name: &str, offset: f32) {
    let device = Device::Cpu;
    let pc0 = Tensor::new(
        &[[0f32, 0., 0.], [3., 0., 0.], [0., 3., 0.], [0., 0., 3.]],
        &device,
    )
    .unwrap();
    let pc1 = (&pc0 + offset as f64).unwrap();
    let flow = Tensor::full(offset, (4, 3), &device).unwrap();

    let mut tensors = HashMap::new();
    tensors.insert("pc0".to_string(), pc0);
    tensors.insert("pc1".to_string(), pc1);
    tensors.insert("flow_0_1".to_string(), flow);
    tensors.insert(
        "mask_0_1".to_string(),
        Tensor::ones(4, DType::F32, &device).unwrap(),
    );
    safetensors::save(&tensors, dir.join(name)).unwrap();
}

/// Test evaluation over a folder of safetensors samples
#[test]
fn test_directory_dataset() {
    let dir = tempfile::tempdir().unwrap();
    write_sample(dir.path(), "000.safetensors", 0.1);
    write_sample(dir.path(), "001.safetensors", 0.2);
    write_sample(dir.path(), "002.safetensors", 0.1);

    let config_path = dir.path().join("eval.yaml");
    std::fs::write(
        &config_path,
        "model: nn_flow\ndataset:\n    batch_size: 2\n    source:\n        kind: directory\n        root: .\n",
    )
    .unwrap();

    let config = ModelConfig::load(&config_path).unwrap();
    let meter = evaluate(&config, quiet()).unwrap();
    let summary = meter.summary();

    // clouds are 3 m apart and shifted by under 0.4 m: nearest neighbour is exact
    assert_eq!(summary["epe3d"].count, 2);
    assert!(summary["epe3d"].mean < 1e-5);
    assert_eq!(summary["acc3d_strict-full"].mean, 1.0);
}

/// Test that the bundled configs parse and name registered models
#[test]
fn test_bundled_configs_load() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
    for name in ["nn_flow", "zero_flow", "residual_mlp"] {
        let config = ModelConfig::load(dir.join(format!("{}.yaml", name))).unwrap();
        assert_eq!(config.model, name);
        assert!(models::available_models().contains(&name));
    }
}
