//! Structured logging using tracing.
//!
//! Provides:
//! - Console output with human-readable formatting, level driven by `-v/-q`
//!   or `RUST_LOG`
//! - Optional file output with JSON formatting and daily rotation

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix (e.g., "gangstar" -> "gangstar.2026-01-15").
    pub log_file_prefix: String,
    /// Maximum log level for our crates on the console.
    pub console_level: Level,
    /// Maximum log level for file output.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: LogRotation,
    /// Whether to write the JSON log file at all.
    pub file_logging: bool,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to include target module in console logs.
    pub include_target: bool,
}

/// Log rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// Create a new log file every hour.
    Hourly,
    /// Create a new log file every day.
    Daily,
    /// Never rotate (single log file).
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: gangstar_core::default_log_directory(),
            log_file_prefix: "gangstar".to_string(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            file_logging: true,
            console_ansi: false,
            include_target: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration for a `-v` count and `-q` flag.
    ///
    /// `quiet` wins over any verbosity.
    #[must_use]
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let console_level = if quiet {
            Level::WARN
        } else {
            match verbose {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };
        Self {
            console_level,
            include_target: verbose > 1,
            ..Self::default()
        }
    }

    /// Enable or disable the log file.
    #[must_use]
    pub const fn with_file_logging(mut self, enabled: bool) -> Self {
        self.file_logging = enabled;
        self
    }

    /// Console filter used when `RUST_LOG` is unset.
    fn console_directives(&self) -> String {
        let level = level_to_directive(self.console_level);
        format!("warn,gangstar={level},gangstar_core={level}")
    }

    /// File filter; dependencies stay at `info` so the file isn't flooded.
    fn file_directives(&self) -> String {
        let level = level_to_directive(self.file_level);
        format!("info,gangstar={level},gangstar_core={level}")
    }
}

/// Guard that keeps file logging active. Drop this to flush and close log files.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system with the given configuration.
///
/// Returns a guard that must be kept alive for the duration of the process.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_directives()));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(config.include_target)
        .without_time()
        .with_filter(console_filter);

    let (file_layer, file_guard) = if config.file_logging {
        if !config.log_directory.exists() {
            std::fs::create_dir_all(&config.log_directory).map_err(|e| {
                LoggingError::DirectoryCreationFailed {
                    path: config.log_directory.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        let file_appender = RollingFileAppender::new(
            config.rotation.into(),
            &config.log_directory,
            &config.log_file_prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::new(config.file_directives()));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Get the path prefix of the current log file (rotation appends a date).
#[must_use]
pub fn current_log_path(config: &LoggingConfig) -> PathBuf {
    config.log_directory.join(&config.log_file_prefix)
}

/// Convert a tracing Level to a filter directive string.
const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// A global subscriber was already set.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.console_level, Level::INFO);
        assert_eq!(config.file_level, Level::DEBUG);
        assert_eq!(config.rotation, LogRotation::Daily);
        assert!(config.file_logging);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LoggingConfig::from_verbosity(0, false).console_level, Level::INFO);
        assert_eq!(LoggingConfig::from_verbosity(1, false).console_level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_verbosity(3, false).console_level, Level::TRACE);
        assert_eq!(LoggingConfig::from_verbosity(2, true).console_level, Level::WARN);
        assert!(LoggingConfig::from_verbosity(2, false).include_target);
    }

    #[test]
    fn test_directives_parse() {
        let config = LoggingConfig::from_verbosity(1, false);
        assert_eq!(
            config.console_directives(),
            "warn,gangstar=debug,gangstar_core=debug"
        );
        assert!(EnvFilter::try_new(config.console_directives()).is_ok());
        assert!(EnvFilter::try_new(config.file_directives()).is_ok());
    }

    #[test]
    fn test_log_rotation_conversion() {
        assert!(matches!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY));
        assert!(matches!(Rotation::from(LogRotation::Daily), Rotation::DAILY));
        assert!(matches!(Rotation::from(LogRotation::Never), Rotation::NEVER));
    }

    #[test]
    fn test_current_log_path_in_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = LoggingConfig {
            log_directory: temp.path().to_path_buf(),
            ..LoggingConfig::default()
        };
        assert_eq!(current_log_path(&config), temp.path().join("gangstar"));
    }
}
