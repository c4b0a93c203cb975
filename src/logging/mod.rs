//! Logging for the engine and the pipeline
//!
//! All diagnostics go through `tracing`. [`init_logging`] installs the
//! subscriber for the binary; library users bring their own. The macros
//! below keep field names consistent for events emitted from several places.
//!
//! Record contents and key material never appear in events. Failures are
//! logged with their position in the input, not the offending value.
//!
//! # Example
//!
//! ```no_run
//! use veil::logging::init_logging;
//! use veil::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(input = "patients.ndjson", "Starting run");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Pipeline finished delivering
///
/// ```no_run
/// use veil::log_pipeline_complete;
/// use std::time::Duration;
///
/// log_pipeline_complete!(42u64, Duration::from_secs(10));
/// ```
#[macro_export]
macro_rules! log_pipeline_complete {
    ($count:expr, $duration:expr) => {
        tracing::info!(
            count = $count,
            duration_ms = $duration.as_millis() as u64,
            "Pipeline completed"
        );
    };
}

/// An error that ends the current operation, with a short context string
///
/// ```no_run
/// use veil::log_error_with_context;
/// use veil::domain::VeilError;
///
/// let error = VeilError::Format("Ciphertext too short".to_string());
/// log_error_with_context!(&error, "Failed to decrypt field");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}

/// A record that failed and was left out of the output
#[macro_export]
macro_rules! log_item_excluded {
    ($batch_index:expr, $offset:expr, $error:expr) => {
        tracing::warn!(
            batch = $batch_index,
            item = $offset,
            error = %$error,
            "Item failed, excluded from output"
        );
    };
}

/// A batch handed to the sink
///
/// ```no_run
/// use veil::log_batch_processing;
///
/// log_batch_processing!(2, 17, 998, 2);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($worker_id:expr, $batch_index:expr, $completed:expr, $failed:expr) => {
        tracing::debug!(
            worker_id = $worker_id,
            batch = $batch_index,
            completed = $completed,
            failed = $failed,
            "Batch delivered"
        );
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn test_macros_expand() {
        let error = crate::domain::VeilError::Other("boom".to_string());
        log_error_with_context!(&error, "while testing");
        log_item_excluded!(3u64, 1usize, &error);
        log_batch_processing!(0usize, 1u64, 10u64, 0u64);
        log_pipeline_complete!(10u64, Duration::from_millis(5));
    }
}
