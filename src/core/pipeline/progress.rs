//! Progress accounting
//!
//! Workers never log progress themselves: the driver updates shared atomic
//! counters after each batch reaches the sink and publishes a
//! [`ProgressMessage`] on an unbounded channel. A reporter task turns the
//! messages into log lines.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receiving end of the progress channel
pub type ProgressStream = mpsc::UnboundedReceiver<ProgressMessage>;

/// Counters shared between the driver and observers
#[derive(Debug, Default)]
pub struct ProgressCounters {
    read: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read(&self, count: u64) {
        self.read.fetch_add(count, Ordering::Relaxed);
    }

    /// Records one delivered batch
    pub fn record_batch(&self, completed: u64, skipped: u64, failed: u64) {
        self.completed.fetch_add(completed, Ordering::Relaxed);
        self.skipped.fetch_add(skipped, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            read: self.read.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub read: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub batches: u64,
}

/// Published after each batch is consumed by the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    /// Partition slot that processed the batch
    pub worker_id: usize,
    /// Zero-based batch sequence number in source order
    pub batch_index: u64,
    pub batch_completed: u64,
    pub batch_skipped: u64,
    pub batch_failed: u64,
    /// Running totals after this batch
    pub totals: ProgressSnapshot,
}

/// Spawns a task logging every progress message until the channel closes
///
/// Resolves to the last totals seen.
pub fn spawn_progress_reporter(mut stream: ProgressStream) -> JoinHandle<ProgressSnapshot> {
    tokio::spawn(async move {
        let mut last = ProgressSnapshot::default();
        while let Some(message) = stream.recv().await {
            crate::log_batch_processing!(
                message.worker_id,
                message.batch_index,
                message.batch_completed,
                message.batch_failed
            );
            tracing::info!(
                read = message.totals.read,
                completed = message.totals.completed,
                skipped = message.totals.skipped,
                failed = message.totals.failed,
                "Pipeline progress"
            );
            last = message.totals;
        }
        last
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = ProgressCounters::new();
        counters.add_read(10);
        counters.record_batch(7, 2, 1);
        counters.record_batch(3, 0, 0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.read, 10);
        assert_eq!(snapshot.completed, 10);
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.batches, 2);
    }

    #[tokio::test]
    async fn test_reporter_returns_last_totals() {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = spawn_progress_reporter(rx);

        let totals = ProgressSnapshot {
            read: 4,
            completed: 4,
            ..Default::default()
        };
        tx.send(ProgressMessage {
            worker_id: 1,
            batch_index: 0,
            batch_completed: 4,
            batch_skipped: 0,
            batch_failed: 0,
            totals,
        })
        .unwrap();
        drop(tx);

        assert_eq!(reporter.await.unwrap(), totals);
    }
}
