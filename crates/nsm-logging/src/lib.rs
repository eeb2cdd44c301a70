//! Process-wide logging setup shared by the namespace binaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("cannot create log file appender in {0:?}: {1}")]
    Appender(PathBuf, String),

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `nsm_manager=debug,info`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. If None, no file logging.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// `hourly`, `daily` or `never`.
    #[serde(default = "default_rotation")]
    pub rotation: String,

    #[serde(default)]
    pub json_format: bool,

    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "nsm".into()
}

fn default_rotation() -> String {
    "daily".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    pub fn rotation(&self) -> Rotation {
        match self.rotation.as_str() {
            "hourly" => Rotation::HOURLY,
            "never" => Rotation::NEVER,
            _ => Rotation::DAILY,
        }
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| LoggingError::InvalidFilter(self.level.clone(), e.to_string()))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(json: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_writer(writer).boxed()
    }
}

/// Install the global subscriber described by `config`.
///
/// The returned guard flushes the non-blocking file writer and must be held
/// for the lifetime of the process when file logging is enabled.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = config.filter()?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console_output {
        layers.push(format_layer(config.json_format, std::io::stdout));
    }

    let guard = match &config.log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(config.rotation())
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| LoggingError::Appender(dir.clone(), e.to_string()))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(config.json_format, writer));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}
