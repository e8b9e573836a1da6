//! Session construction: execution-provider selection with fallback and
//! TensorRT engine caching.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Execution provider selection.
///
/// `Tensorrt` registers CUDA as a fallback, and ORT falls back to CPU when
/// neither GPU provider can be loaded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    Cpu,
    Cuda,
    Tensorrt,
}

impl InferenceBackend {
    /// Parse from string (case-insensitive). Returns `Cpu` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Self::Cuda,
            "tensorrt" | "trt" => Self::Tensorrt,
            _ => Self::Cpu,
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::Tensorrt => write!(f, "tensorrt"),
        }
    }
}

pub struct SessionConfig<'a> {
    pub model_path: &'a Path,
    pub backend: InferenceBackend,
    pub trt_cache_dir: Option<&'a Path>,
    /// Intra-op thread count; 0 keeps the runtime default.
    pub intra_threads: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CacheStats {
    file_count: u64,
    total_bytes: u64,
}

fn cache_stats(root: &Path) -> CacheStats {
    let mut stats = CacheStats::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = entry.metadata() {
                stats.file_count += 1;
                stats.total_bytes += meta.len();
            }
        }
    }

    stats
}

pub fn resolve_trt_cache_dir(config: &SessionConfig<'_>) -> PathBuf {
    config
        .trt_cache_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("trt_cache"))
}

fn commit(mut builder: SessionBuilder, model_path: &Path) -> Result<Session> {
    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model: {}", model_path.display()))
}

/// Build an `ort::Session` for `config.backend`.
pub fn build_session(config: &SessionConfig<'_>) -> Result<Session> {
    let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    let session = match config.backend {
        InferenceBackend::Cpu => {
            debug!(backend = "cpu", "Building session with default CPU EP");
            commit(builder, config.model_path)?
        }
        InferenceBackend::Cuda => {
            let cuda = CUDAExecutionProvider::default();
            if !cuda.is_available().unwrap_or(false) {
                warn!("CUDA EP is not available, inference will fall back to CPU");
            }
            debug!(backend = "cuda", "Building session with CUDA EP");
            let builder = builder.with_execution_providers([cuda.build()])?;
            commit(builder, config.model_path)?
        }
        InferenceBackend::Tensorrt => {
            let cache_dir = resolve_trt_cache_dir(config);
            if let Err(e) = std::fs::create_dir_all(&cache_dir) {
                warn!(
                    dir = %cache_dir.display(),
                    error = %e,
                    "Failed to create TRT cache directory"
                );
            }

            let before = cache_stats(&cache_dir);
            let started = Instant::now();
            info!(
                cache_dir = %cache_dir.display(),
                cache_files = before.file_count,
                cache_bytes = before.total_bytes,
                "Initializing TensorRT session (first run may take several minutes)"
            );

            let builder = builder.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_engine_cache(true)
                    .with_engine_cache_path(cache_dir.to_string_lossy().to_string())
                    .with_fp16(true)
                    .with_device_id(0)
                    .build(),
                CUDAExecutionProvider::default().build(),
            ])?;

            let elapsed = || started.elapsed().as_secs_f64();
            match commit(builder, config.model_path) {
                Ok(session) => {
                    let after = cache_stats(&cache_dir);
                    info!(
                        elapsed_secs = elapsed(),
                        cache_dir = %cache_dir.display(),
                        cache_updated = after != before,
                        cache_files = after.file_count,
                        "TensorRT session ready"
                    );
                    session
                }
                Err(e) => {
                    error!(
                        elapsed_secs = elapsed(),
                        cache_dir = %cache_dir.display(),
                        error = %e,
                        "TensorRT session initialization failed"
                    );
                    return Err(e);
                }
            }
        }
    };

    info!(
        model = %config.model_path.display(),
        backend = %config.backend,
        inputs = session.inputs().len(),
        outputs = session.outputs().len(),
        "Session ready"
    );
    Ok(session)
}
