//! sceneflow-eval CLI - evaluate a scene-flow model on its test set

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sceneflow_eval::{evaluate, format_summary, visualize, EvalError, EvalOptions, ModelConfig, VERSION};

/// Evaluate a scene-flow estimator and print its test metrics
#[derive(Parser, Debug)]
#[command(name = "sceneflow-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    config: PathBuf,

    /// Device to run on
    #[arg(long, value_enum, default_value_t = DeviceArg::Cuda)]
    device: DeviceArg,

    /// Whether or not to visualize
    #[arg(long)]
    visualize: bool,

    /// Directory for visualization output
    #[arg(long, default_value = "flow_vis")]
    vis_dir: PathBuf,

    /// Also write the metric summary as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DeviceArg {
    Cpu,
    Cuda,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn select_device(arg: DeviceArg) -> Result<Device> {
    match arg {
        DeviceArg::Cpu => Ok(Device::Cpu),
        DeviceArg::Cuda => {
            let device = Device::cuda_if_available(0)?;
            if !device.is_cuda() {
                warn!("CUDA requested but not available, falling back to CPU");
            }
            Ok(device)
        }
    }
}

/// SIGINT / SIGTERM stop the run before the next batch; a second signal
/// terminates the process
fn register_stop_signals() -> Result<Arc<AtomicBool>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        // Order matters: the shutdown check must see the flag before it is set
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&stop_flag))
            .with_context(|| format!("Failed to register handler for signal {}", signal))?;
        signal_hook::flag::register(signal, Arc::clone(&stop_flag))
            .with_context(|| format!("Failed to register handler for signal {}", signal))?;
    }
    Ok(stop_flag)
}

fn run(cli: &Cli) -> Result<()> {
    let config = ModelConfig::load(&cli.config).context("Failed to load config")?;
    let device = select_device(cli.device)?;

    let stop_flag = register_stop_signals()?;

    let renderer = if cli.visualize {
        Some(visualize::renderer(&cli.vis_dir)?)
    } else {
        None
    };

    let meter = evaluate(
        &config,
        EvalOptions {
            device,
            renderer,
            stop_flag: Some(stop_flag),
            show_progress: true,
        },
    )?;

    let summary = meter.summary();
    print!("{}", format_summary(&summary)?);

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote metric summary to {:?}", path);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("sceneflow-eval v{}", VERSION);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => exit_code(&err),
    }
}

/// Report `err` and pick the process status for it
fn exit_code(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<EvalError>() {
        Some(e) if e.is_quiet_exit() => ExitCode::SUCCESS,
        Some(EvalError::VisualizationUnavailable) => {
            println!("Please enable the `visualize` feature for visualization!");
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Error: {:?}", err);
            ExitCode::FAILURE
        }
    }
}
