//! Pipeline summary and reporting

use std::time::Duration;

/// Upper bound on item error messages kept in a summary
pub const MAX_RECORDED_ERRORS: usize = 100;

/// Outcome of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    /// Items pulled from the source
    pub total_read: u64,

    /// Items that produced output delivered to the sink
    pub completed: u64,

    /// Items the per-item function deliberately skipped
    pub skipped: u64,

    /// Items whose processing failed and were excluded from the output
    pub failed: u64,

    /// Batches delivered to the sink
    pub batches: u64,

    /// Duration of the run
    pub duration: Duration,

    /// True when a shutdown signal stopped admission early
    pub interrupted: bool,

    /// First item errors, capped at [`MAX_RECORDED_ERRORS`]
    pub errors: Vec<String>,
}

impl PipelineSummary {
    /// Create a new empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Record item errors, keeping the first [`MAX_RECORDED_ERRORS`]
    pub fn add_errors(&mut self, errors: impl IntoIterator<Item = String>) {
        let room = MAX_RECORDED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(errors.into_iter().take(room));
    }

    /// Items accounted for at the sink side
    pub fn total_processed(&self) -> u64 {
        self.completed + self.skipped + self.failed
    }

    /// Check if the run finished without failures or interruption
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    /// Get success rate as a percentage of processed items
    pub fn success_rate(&self) -> f64 {
        let processed = self.total_processed();
        if processed == 0 {
            return 100.0;
        }
        ((self.completed + self.skipped) as f64 / processed as f64) * 100.0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            total_read = self.total_read,
            completed = self.completed,
            skipped = self.skipped,
            failed = self.failed,
            batches = self.batches,
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            success_rate = format!("{:.2}%", self.success_rate()),
            "Pipeline completed"
        );

        if !self.errors.is_empty() {
            tracing::warn!(
                error_count = self.failed,
                "Pipeline completed with item failures"
            );
            for error in &self.errors {
                tracing::warn!(message = %error, "Item failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_with_duration() {
        let summary = PipelineSummary::new().with_duration(Duration::from_secs(3));
        assert_eq!(summary.duration, Duration::from_secs(3));
        assert!(summary.is_successful());
    }

    #[test]
    fn test_success_rate() {
        let mut summary = PipelineSummary::new();
        assert_eq!(summary.success_rate(), 100.0);

        summary.completed = 90;
        summary.skipped = 5;
        summary.failed = 5;
        assert_eq!(summary.success_rate(), 95.0);
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_interrupted_is_not_successful() {
        let summary = PipelineSummary {
            interrupted: true,
            ..Default::default()
        };
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_error_list_is_capped() {
        let mut summary = PipelineSummary::new();
        summary.add_errors((0..MAX_RECORDED_ERRORS + 20).map(|i| format!("item {i}")));
        assert_eq!(summary.errors.len(), MAX_RECORDED_ERRORS);
        summary.add_errors(vec!["late".to_string()]);
        assert_eq!(summary.errors.len(), MAX_RECORDED_ERRORS);
    }
}
