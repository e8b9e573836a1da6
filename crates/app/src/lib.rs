use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use half::f16;
use ort::session::SessionInputs;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use tensorprep_core::config::{
    config_path, data_dir, initialize_data_dir, AppConfig, DEFAULT_LOG_RETENTION_FILES,
};
use tensorprep_core::engine::output_views;
use tensorprep_core::logging::{self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER};
use tensorprep_core::model_inspect::inspect_onnx;
use tensorprep_core::session::{build_session, InferenceBackend, SessionConfig};
use tensorprep_core::{ElementType, ModelContract, TensorSet};

#[derive(Parser)]
#[command(
    name = "tensorprep",
    about = "Prepare, validate and run tensors against ONNX models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a model's signature and graph statistics as JSON.
    Inspect(InspectArgs),
    /// Validate constant-filled inputs against a model's declared inputs.
    Check(CheckArgs),
    /// Run a model once on constant-filled inputs.
    Run(RunArgs),
}

#[derive(Args)]
struct InspectArgs {
    #[arg(help = "Path to an ONNX model (relative paths are also tried in models_dir)")]
    model: PathBuf,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(help = "Path to an ONNX model (relative paths are also tried in models_dir)")]
    model: PathBuf,
    #[arg(
        long = "input",
        value_name = "DTYPE:D0,D1,...",
        required = true,
        help = "Input tensor description, in feed order (repeatable, e.g. --input float32:1,3,224,224)"
    )]
    inputs: Vec<InputArg>,
}

#[derive(Args)]
struct RunArgs {
    #[arg(help = "Path to an ONNX model (relative paths are also tried in models_dir)")]
    model: PathBuf,
    #[arg(
        long = "input",
        value_name = "DTYPE:D0,D1,...",
        help = "Input tensor description; defaults to the model's own inputs"
    )]
    inputs: Vec<InputArg>,
    #[arg(long, default_value_t = 0.0, help = "Value every input element is set to")]
    fill: f64,
    #[arg(
        long,
        default_value_t = 1,
        help = "Extent used for dynamic dimensions when inputs are derived from the model"
    )]
    dynamic_dim: u64,
    #[arg(long, help = "Execution backend: cpu, cuda or tensorrt (overrides config)")]
    backend: Option<String>,
}

/// `--input` value: element type and concrete shape.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputArg {
    element_type: ElementType,
    shape: Vec<usize>,
}

impl FromStr for InputArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dtype, dims) = s
            .split_once(':')
            .ok_or_else(|| format!("expected DTYPE:D0,D1,... but got '{s}'"))?;
        let element_type = dtype.parse::<ElementType>()?;
        let shape = if dims.trim().is_empty() {
            Vec::new()
        } else {
            dims.split(',')
                .map(|d| {
                    d.trim()
                        .parse::<usize>()
                        .map_err(|e| format!("invalid dimension '{d}': {e}"))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self {
            element_type,
            shape,
        })
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    // Config problems are reported once logging is up.
    let init_result = initialize_data_dir(&resolved_data_dir);
    let config_result = AppConfig::load_from_path(&config_path(&resolved_data_dir));
    let retention_files = config_result
        .as_ref()
        .map(|cfg| cfg.logging.retention_files)
        .unwrap_or(DEFAULT_LOG_RETENTION_FILES);

    tensorprep_core::runtime::setup_runtime_libs(&[resolved_data_dir.join("lib")]);
    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
        retention_files,
    );
    tensorprep_core::runtime::log_runtime_lib_status();

    if let Err(e) = init_result {
        warn!(error = %format!("{e:#}"), "Failed to initialize data directory");
    }
    let config = config_result.unwrap_or_else(|err| {
        warn!(error = %format!("{err:#}"), "Failed to load config file, using defaults");
        AppConfig::default()
    });
    info!(
        pid = std::process::id(),
        data_dir = %resolved_data_dir.display(),
        config_path = %config_path(&resolved_data_dir).display(),
        "Runtime startup metadata"
    );

    match cli.command {
        Commands::Inspect(args) => {
            let model = config.resolve_model_path(&resolved_data_dir, &args.model);
            run_inspect(&model)
        }
        Commands::Check(args) => {
            let model = config.resolve_model_path(&resolved_data_dir, &args.model);
            run_check(&model, &args.inputs)
        }
        Commands::Run(args) => run_model(&config, &resolved_data_dir, args),
    }
}

fn init_logging(
    data_dir: Option<&Path>,
    verbose: u8,
    cli_log_filter: Option<&str>,
    retention_files: usize,
) {
    let init_options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        retention_files,
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let console_filter = init_plan.filters.console_filter;
    let file_filter = init_plan.filters.file_filter;
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(parse_env_filter_with_fallback(&console_filter, "console"));

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let subscriber = tracing_subscriber::registry().with(console_layer).with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(ready.appender)
                    .with_filter(parse_env_filter_with_fallback(&file_filter, "file")),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let subscriber = tracing_subscriber::registry().with(console_layer);
            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            warn!(
                attempted_log_dir = ?fallback.attempted_log_dir,
                reason = %fallback.reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn run_inspect(model: &Path) -> Result<()> {
    let inspection = inspect_onnx(model)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&inspection).context("failed to serialize inspection")?
    );
    Ok(())
}

fn run_check(model: &Path, inputs: &[InputArg]) -> Result<()> {
    let contract = ModelContract::from_onnx_file(model)?;
    let set = filled_tensor_set(inputs, 0.0)?;
    contract
        .check_inputs(&set.views())
        .with_context(|| format!("inputs do not match {}", model.display()))?;

    for (spec, view) in contract.inputs.iter().zip(set.iter()) {
        println!("{}: {} {:?} ok", spec.name, view.element_type(), view.shape());
    }
    Ok(())
}

fn run_model(config: &AppConfig, data_dir: &Path, args: RunArgs) -> Result<()> {
    let model = config.resolve_model_path(data_dir, &args.model);
    let backend = args
        .backend
        .as_deref()
        .map(InferenceBackend::from_str_lossy)
        .unwrap_or(config.inference.backend);
    let trt_cache_dir = config.trt_cache_dir(data_dir);

    let mut session = build_session(&SessionConfig {
        model_path: &model,
        backend,
        trt_cache_dir: Some(&trt_cache_dir),
        intra_threads: config.inference.intra_threads,
    })?;
    let contract = ModelContract::from_session(&session)?;

    let inputs = if args.inputs.is_empty() {
        derived_inputs(&contract, args.dynamic_dim)
    } else {
        args.inputs
    };
    let set = filled_tensor_set(&inputs, args.fill)?;
    let named = set.session_inputs(&contract)?;

    let started = std::time::Instant::now();
    let outputs = session
        .run(SessionInputs::<'_, '_, 0>::ValueMap(named))
        .with_context(|| format!("inference failed for {}", model.display()))?;
    info!(
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Inference complete"
    );

    let views = output_views(&outputs, &contract.outputs)?;
    for (name, view) in contract.outputs.iter().zip(&views) {
        println!("{name}: {} {:?}", view.element_type(), view.shape());
    }
    Ok(())
}

fn derived_inputs(contract: &ModelContract, dynamic_dim: u64) -> Vec<InputArg> {
    contract
        .inputs
        .iter()
        .map(|spec| InputArg {
            element_type: spec.element_type,
            shape: spec.concrete_shape(dynamic_dim),
        })
        .collect()
}

/// Owned, constant-filled tensors for each described input, in order.
fn filled_tensor_set(inputs: &[InputArg], fill: f64) -> tensorprep_core::Result<TensorSet<'static>> {
    let mut set = TensorSet::new();
    for input in inputs {
        let len: usize = input.shape.iter().product();
        let shape = &input.shape;
        match input.element_type {
            ElementType::Float32 => set.insert_tensor_from_data(&vec![fill as f32; len], shape)?,
            ElementType::Uint8 => set.insert_tensor_from_data(&vec![fill as u8; len], shape)?,
            ElementType::Uint16 => set.insert_tensor_from_data(&vec![fill as u16; len], shape)?,
            ElementType::Float16 => {
                set.insert_tensor_from_data(&vec![f16::from_f64(fill); len], shape)?
            }
            ElementType::Int64 => set.insert_tensor_from_data(&vec![fill as i64; len], shape)?,
        }
    }
    Ok(set)
}
