use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{DeviceMemoryError, Result};

static INIT: Once = Once::new();

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    /// Whether to include source code locations
    pub source_location: bool,
    /// Whether to include thread ids
    pub thread_ids: bool,
    /// Whether to log span close events
    pub log_spans: bool,
    /// Output file path (None for stdout)
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            source_location: true,
            thread_ids: true,
            log_spans: false,
            file_path: None,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.into(),
            file_path: config.log_file.clone(),
            ..Default::default()
        }
    }
}

/// Initialize logging system.
///
/// Only the first call installs a subscriber; later calls return `Ok(())`.
pub fn setup_logging(config: LogConfig) -> Result<()> {
    let mut result = Ok(());

    INIT.call_once(|| {
        result = setup_logging_internal(config);
    });

    result
}

fn setup_logging_internal(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(config.level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(config.thread_ids)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(if config.log_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let installed = if let Some(path) = config.file_path {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DeviceMemoryError::LoggingError {
                message: format!("Failed to open log file {}: {}", path.display(), e),
            })?;

        subscriber
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| DeviceMemoryError::LoggingError {
        message: format!("Failed to set global subscriber: {}", e),
    })
}
