use std::fs;
use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config::DEFAULT_LOG_RETENTION_FILES;

pub const DEFAULT_LOG_FILTER: &str = "info";
/// Prepended to implicitly selected console filters.
pub const DEFAULT_NOISE_FILTER: &str = "ort=warn";
/// File counterpart of [`DEFAULT_NOISE_FILTER`]; the file keeps runtime
/// provider details that would clutter the console.
pub const DEFAULT_FILE_NOISE_FILTER: &str = "ort=info";
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "tensorprep";
pub const DEFAULT_LOG_FILE_SUFFIX: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingInitOptions {
    pub data_dir: Option<PathBuf>,
    pub verbose: u8,
    pub cli_log_filter: Option<String>,
    pub rust_log_env: Option<String>,
    pub default_log_filter: String,
    pub include_noise_filter_when_implicit: bool,
    pub retention_files: usize,
}

impl Default for LoggingInitOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            verbose: 0,
            cli_log_filter: None,
            rust_log_env: None,
            default_log_filter: DEFAULT_LOG_FILTER.to_string(),
            include_noise_filter_when_implicit: true,
            retention_files: DEFAULT_LOG_RETENTION_FILES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingFilterPlan {
    pub user_filter: String,
    pub console_filter: String,
    pub file_filter: String,
}

#[derive(Debug)]
pub struct LoggingInitPlan {
    pub filters: LoggingFilterPlan,
    pub file_sink: FileSinkPlan,
}

#[derive(Debug)]
pub enum FileSinkPlan {
    Ready(ReadyFileSinkPlan),
    Fallback(FallbackFileSinkPlan),
}

#[derive(Debug)]
pub struct ReadyFileSinkPlan {
    pub log_dir: PathBuf,
    pub retention_files: usize,
    pub appender: RollingFileAppender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFileSinkPlan {
    pub attempted_log_dir: Option<PathBuf>,
    pub retention_files: usize,
    pub reason: String,
}

impl FileSinkPlan {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn retention_files(&self) -> usize {
        match self {
            Self::Ready(plan) => plan.retention_files,
            Self::Fallback(plan) => plan.retention_files,
        }
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Fallback(plan) => Some(plan.reason.as_str()),
        }
    }
}

pub fn compose_logging_init_plan(options: &LoggingInitOptions) -> LoggingInitPlan {
    LoggingInitPlan {
        filters: compose_logging_filters(options),
        file_sink: build_file_sink_plan(options),
    }
}

/// Daily-rolling file sink under `<data_dir>/logs`. Falls back (console only)
/// when no data directory is configured or the directory cannot be created.
pub fn build_file_sink_plan(options: &LoggingInitOptions) -> FileSinkPlan {
    let retention_files = normalize_retention_files(options.retention_files);

    let Some(data_dir) = options.data_dir.as_deref() else {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: None,
            retention_files,
            reason: "file sink disabled: data_dir is not configured".to_string(),
        });
    };

    let log_dir = data_dir.join(DEFAULT_LOG_DIR_NAME);
    if let Err(error) = fs::create_dir_all(&log_dir) {
        return FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to create log directory: {error}"),
        });
    }

    let appender_builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(DEFAULT_LOG_FILE_PREFIX)
        .filename_suffix(DEFAULT_LOG_FILE_SUFFIX)
        .max_log_files(retention_files);

    match appender_builder.build(&log_dir) {
        Ok(appender) => FileSinkPlan::Ready(ReadyFileSinkPlan {
            log_dir,
            retention_files,
            appender,
        }),
        Err(error) => FileSinkPlan::Fallback(FallbackFileSinkPlan {
            attempted_log_dir: Some(log_dir),
            retention_files,
            reason: format!("failed to initialize rolling file sink: {error}"),
        }),
    }
}

/// Filter precedence: `--log-filter`, then `-v`/`-vv`, then `RUST_LOG`, then
/// the default. The noise filter is only prepended when the user did not
/// pick a filter explicitly.
pub fn compose_logging_filters(options: &LoggingInitOptions) -> LoggingFilterPlan {
    let user_filter = select_user_filter(options);
    let include_noise = options.include_noise_filter_when_implicit
        && options.cli_log_filter.is_none()
        && options.verbose == 0;

    LoggingFilterPlan {
        console_filter: merge_noise_filter(DEFAULT_NOISE_FILTER, &user_filter, include_noise),
        file_filter: merge_noise_filter(DEFAULT_FILE_NOISE_FILTER, &user_filter, include_noise),
        user_filter,
    }
}

fn normalize_retention_files(retention_files: usize) -> usize {
    if retention_files == 0 {
        DEFAULT_LOG_RETENTION_FILES
    } else {
        retention_files
    }
}

fn select_user_filter(options: &LoggingInitOptions) -> String {
    if let Some(filter) = options.cli_log_filter.as_deref() {
        filter.to_string()
    } else if options.verbose >= 2 {
        "trace".to_string()
    } else if options.verbose == 1 {
        "debug".to_string()
    } else if let Some(filter) = options.rust_log_env.as_deref().filter(|f| !f.trim().is_empty()) {
        filter.to_string()
    } else {
        options.default_log_filter.clone()
    }
}

fn merge_noise_filter(noise_filter: &str, user_filter: &str, include_noise_filter: bool) -> String {
    if include_noise_filter && !noise_filter.trim().is_empty() {
        format!("{noise_filter},{user_filter}")
    } else {
        user_filter.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn cli_log_filter_overrides_everything() {
        let options = LoggingInitOptions {
            verbose: 2,
            cli_log_filter: Some("tensorprep_core=trace".to_string()),
            rust_log_env: Some("error".to_string()),
            ..Default::default()
        };

        let filters = compose_logging_filters(&options);
        assert_eq!(filters.user_filter, "tensorprep_core=trace");
        assert_eq!(filters.console_filter, "tensorprep_core=trace");
        assert_eq!(filters.file_filter, "tensorprep_core=trace");
    }

    #[test]
    fn verbose_levels_map_to_debug_and_trace() {
        let debug = LoggingInitOptions {
            verbose: 1,
            rust_log_env: Some("warn".to_string()),
            ..Default::default()
        };
        let trace = LoggingInitOptions {
            verbose: 2,
            ..debug.clone()
        };

        assert_eq!(compose_logging_filters(&debug).console_filter, "debug");
        assert_eq!(compose_logging_filters(&trace).console_filter, "trace");
    }

    #[test]
    fn rust_log_env_used_when_no_cli_or_verbose() {
        let options = LoggingInitOptions {
            rust_log_env: Some("warn,my_crate=debug".to_string()),
            ..Default::default()
        };

        let filters = compose_logging_filters(&options);
        assert_eq!(filters.user_filter, "warn,my_crate=debug");
        assert_eq!(filters.console_filter, "ort=warn,warn,my_crate=debug");
        assert_eq!(filters.file_filter, "ort=info,warn,my_crate=debug");
    }

    #[test]
    fn blank_rust_log_falls_back_to_default() {
        let options = LoggingInitOptions {
            rust_log_env: Some("  ".to_string()),
            include_noise_filter_when_implicit: false,
            ..Default::default()
        };
        assert_eq!(compose_logging_filters(&options).console_filter, "info");
    }

    #[test]
    fn file_sink_requires_data_dir() {
        let plan = build_file_sink_plan(&LoggingInitOptions::default());
        assert!(!plan.is_ready());
        assert!(plan
            .fallback_reason()
            .is_some_and(|reason| reason.contains("data_dir")));
    }

    #[test]
    fn file_sink_created_under_logs_dir() {
        let dir = tempdir().unwrap();
        let options = LoggingInitOptions {
            data_dir: Some(dir.path().to_path_buf()),
            retention_files: 0,
            ..Default::default()
        };

        let plan = compose_logging_init_plan(&options);
        assert!(plan.file_sink.is_ready());
        assert_eq!(plan.file_sink.retention_files(), DEFAULT_LOG_RETENTION_FILES);
        match plan.file_sink {
            FileSinkPlan::Ready(ready) => assert_eq!(ready.log_dir, dir.path().join("logs")),
            FileSinkPlan::Fallback(fallback) => panic!("unexpected fallback: {}", fallback.reason),
        }
    }

    #[test]
    fn file_sink_falls_back_when_data_dir_is_a_file() {
        let file = NamedTempFile::new().unwrap();
        let options = LoggingInitOptions {
            data_dir: Some(file.path().to_path_buf()),
            retention_files: 3,
            ..Default::default()
        };

        let plan = build_file_sink_plan(&options);
        assert!(!plan.is_ready());
        assert_eq!(plan.retention_files(), 3);
        assert!(plan
            .fallback_reason()
            .is_some_and(|reason| reason.contains("failed to create log directory")));
    }
}
