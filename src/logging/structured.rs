//! Subscriber setup for the `veil` binary
//!
//! Human-readable events go to stderr so that stdout stays free for the run
//! summary. When `logging.local_enabled` is set, the same events are also
//! written as JSON lines to a rolling file under `logging.local_path`.
//!
//! # Example
//!
//! ```no_run
//! use veil::logging::init_logging;
//! use veil::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("debug", &config).expect("Failed to initialize logging");
//! ```

use crate::config::LoggingConfig;
use crate::domain::{ConfigurationError, Result, VeilError};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Flushes the file writer when dropped; hold it until shutdown
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    file: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// True when events are also written to a log file
    pub fn writes_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Installs the global tracing subscriber
///
/// `RUST_LOG`, when set, replaces the `veil=<level>` directive built from
/// `log_level`. Fails if a global subscriber is already installed.
///
/// ```no_run
/// use veil::logging::init_logging;
/// use veil::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// let _guard = init_logging("info", &config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(log_level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = build_filter(parse_log_level(log_level)?);

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let (file_layer, file_guard) = match file_writer(config)? {
        Some((writer, guard)) => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_thread_ids(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| {
            VeilError::Configuration(ConfigurationError::Invalid(format!(
                "Logging already initialized: {e}"
            )))
        })?;

    tracing::debug!(
        level = %log_level,
        file = config.local_enabled,
        path = %config.local_path,
        rotation = %config.local_rotation,
        "Logging initialized"
    );

    Ok(LoggingGuard { file: file_guard })
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("veil={}", level.as_str().to_lowercase())))
}

/// Opens the rolling log file, creating its directory first
fn file_writer(config: &LoggingConfig) -> Result<Option<(NonBlocking, WorkerGuard)>> {
    if !config.local_enabled {
        return Ok(None);
    }

    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        VeilError::Io(format!(
            "Failed to create log directory {}: {e}",
            config.local_path
        ))
    })?;

    let appender = RollingFileAppender::new(
        rotation(&config.local_rotation),
        &config.local_path,
        &config.file_name,
    );
    Ok(Some(tracing_appender::non_blocking(appender)))
}

fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    level.to_lowercase().parse::<Level>().map_err(|_| {
        VeilError::Configuration(ConfigurationError::Invalid(format!(
            "Invalid log level: {level}. Must be one of: trace, debug, info, warn, error"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);

        let err = parse_log_level("verbose").unwrap_err();
        assert!(err.to_string().contains("Invalid log level: verbose"));
        assert!(parse_log_level("").is_err());
    }

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("hourly"), Rotation::HOURLY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("daily"), Rotation::DAILY);
    }

    #[test]
    fn test_file_writer_disabled() {
        let config = LoggingConfig {
            local_enabled: false,
            ..Default::default()
        };
        assert!(file_writer(&config).unwrap().is_none());
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("nested").join("logs");
        let config = LoggingConfig {
            local_enabled: true,
            local_path: log_dir.to_string_lossy().to_string(),
            local_rotation: "never".to_string(),
            file_name: "veil.log".to_string(),
        };

        let writer = file_writer(&config).unwrap();
        assert!(writer.is_some());
        assert!(log_dir.is_dir());
    }
}
