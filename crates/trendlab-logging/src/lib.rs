//! Shared logging infrastructure for TrendLab applications.
//!
//! This crate provides unified logging setup using the `tracing` ecosystem:
//! - Stderr output for interactive CLI use.
//! - File-based logging with daily rotation for unattended runs.
//! - Environment-based configuration.
//!
//! The backtest engine (`trendlab-core`) never installs a subscriber itself —
//! it only emits `tracing` events. Callers (the CLI, or any other host) wire
//! up a subscriber with this crate before running a backtest.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trendlab_logging::{LogConfig, init_cli_logging};
//!
//! let config = LogConfig::from_env();
//! let _guard = init_cli_logging(&config);
//!
//! tracing::info!("backtest starting");
//! ```

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Configuration for TrendLab logging.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable logging output.
    pub enabled: bool,
    /// Log level filter (e.g., "info", "debug", "trendlab=debug,trendlab_core=trace").
    pub filter: String,
    /// Directory for log files (used only when `log_to_file` is set).
    pub log_dir: PathBuf,
    /// Write to a rotating file instead of stderr.
    pub log_to_file: bool,
    /// Enable daily log rotation when logging to a file.
    pub rotate_daily: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter: "info,trendlab=debug".to_string(),
            log_dir: PathBuf::from("data/logs"),
            log_to_file: false,
            rotate_daily: true,
        }
    }
}

impl LogConfig {
    /// Create a new LogConfig with the specified filter, enabled, logging to stderr.
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            enabled: true,
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// Create LogConfig from environment variables.
    ///
    /// Reads:
    /// - `TRENDLAB_LOG_ENABLED`: set to "1" or "true" to enable logging
    /// - `TRENDLAB_LOG_FILTER`: log filter string (default: "info,trendlab=debug")
    /// - `TRENDLAB_LOG_DIR`: log directory when file logging is requested
    /// - `TRENDLAB_LOG_TO_FILE`: set to "1" or "true" to log to a file instead of stderr
    pub fn from_env() -> Self {
        let enabled = std::env::var("TRENDLAB_LOG_ENABLED")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let filter = std::env::var("TRENDLAB_LOG_FILTER")
            .unwrap_or_else(|_| "info,trendlab=debug".to_string());

        let log_dir = std::env::var("TRENDLAB_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/logs"));

        let log_to_file = std::env::var("TRENDLAB_LOG_TO_FILE")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            enabled,
            filter,
            log_dir,
            log_to_file,
            rotate_daily: true,
        }
    }
}

/// Guard that ensures buffered logs are flushed on drop.
///
/// Keep this guard alive for the duration of logging.
pub struct LogGuard {
    _worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

impl LogGuard {
    fn new(worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>) -> Self {
        Self {
            _worker_guard: worker_guard,
        }
    }

    /// Create an empty guard (no-op).
    pub fn empty() -> Self {
        Self {
            _worker_guard: None,
        }
    }
}

fn create_file_appender(config: &LogConfig) -> RollingFileAppender {
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let rotation = if config.rotate_daily {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    };

    RollingFileAppender::new(rotation, &config.log_dir, "trendlab.log")
}

fn create_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(&config.filter).unwrap_or_else(|e| {
        eprintln!("Warning: Invalid log filter '{}': {}", config.filter, e);
        EnvFilter::new("info")
    })
}

/// Initialize logging for the CLI.
///
/// Logs to stderr by default (compact, ANSI colors); set `log_to_file` in the
/// config to write to a daily-rotating file instead, for unattended runs.
///
/// Returns `None` if logging is disabled.
pub fn init_cli_logging(config: &LogConfig) -> Option<LogGuard> {
    if !config.enabled {
        return None;
    }

    let filter = create_filter(config);

    if config.log_to_file {
        let file_appender = create_file_appender(config);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(non_blocking)
            .with_filter(filter);

        tracing_subscriber::registry().with(file_layer).init();
        Some(LogGuard::new(Some(guard)))
    } else {
        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter);

        tracing_subscriber::registry().with(stderr_layer).init();
        Some(LogGuard::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.filter, "info,trendlab=debug");
        assert_eq!(config.log_dir, PathBuf::from("data/logs"));
        assert!(!config.log_to_file);
    }

    #[test]
    fn test_log_config_new() {
        let config = LogConfig::new("debug");
        assert!(config.enabled);
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_log_config_from_env() {
        std::env::remove_var("TRENDLAB_LOG_ENABLED");
        std::env::remove_var("TRENDLAB_LOG_FILTER");

        let config = LogConfig::from_env();
        assert!(!config.enabled);

        std::env::set_var("TRENDLAB_LOG_ENABLED", "1");
        std::env::set_var("TRENDLAB_LOG_FILTER", "trace");

        let config = LogConfig::from_env();
        assert!(config.enabled);
        assert_eq!(config.filter, "trace");

        std::env::remove_var("TRENDLAB_LOG_ENABLED");
        std::env::remove_var("TRENDLAB_LOG_FILTER");
    }
}
