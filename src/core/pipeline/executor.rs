//! Partitioned batch executor
//!
//! Reads `batch_size` items at a time and hands each batch to a tokio task
//! that runs the per-item function over it sequentially. At most
//! `partition_count` batches are in flight; when the window is full the
//! driver waits for one to finish before reading more, which bounds memory
//! and concurrency together.
//!
//! With `keep_order` the driver always drains the oldest batch, so the sink
//! sees source order. Without it, whichever batch finishes first is
//! delivered.
//!
//! # Example
//!
//! ```no_run
//! use veil::core::pipeline::{CollectSink, IterSource, PartitionedExecutor, PipelineOptions};
//!
//! # async fn example() -> veil::domain::Result<()> {
//! let mut source = IterSource::new(0..10_000u32);
//! let mut sink = CollectSink::new();
//! let executor = PartitionedExecutor::new(PipelineOptions::default());
//! let summary = executor
//!     .run(&mut source, &mut sink, |n| async move { Ok(Some(n * 2)) })
//!     .await?;
//! assert_eq!(summary.completed, 10_000);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesOrdered, FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use super::progress::{ProgressCounters, ProgressMessage, ProgressStream};
use super::summary::PipelineSummary;
use super::traits::{Sink, Source};
use crate::config::ProcessingConfig;
use crate::domain::{ConfigurationError, Result, VeilError};

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Items per batch
    pub batch_size: usize,

    /// Maximum batches in flight
    pub partition_count: usize,

    /// Deliver batches in source order
    pub keep_order: bool,

    /// Log, count and drop failed items instead of aborting the run
    pub skip_failed_item: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            partition_count: 4,
            keep_order: true,
            skip_failed_item: true,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::Invalid("batch_size must be greater than 0".into()).into());
        }
        if self.partition_count == 0 {
            return Err(
                ConfigurationError::Invalid("partition_count must be greater than 0".into()).into(),
            );
        }
        Ok(())
    }
}

impl From<&ProcessingConfig> for PipelineOptions {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            partition_count: config.partition_count,
            keep_order: config.keep_order,
            skip_failed_item: config.skip_failed_item,
        }
    }
}

/// Result of one batch task
struct BatchOutput<O> {
    index: u64,
    worker_id: usize,
    outputs: Vec<O>,
    skipped: u64,
    failed: u64,
    errors: Vec<String>,
    fatal: Option<VeilError>,
}

/// In-flight window in either delivery discipline
enum InFlight<T> {
    Ordered(FuturesOrdered<JoinHandle<T>>),
    Unordered(FuturesUnordered<JoinHandle<T>>),
}

impl<T: Send + 'static> InFlight<T> {
    fn new(keep_order: bool) -> Self {
        if keep_order {
            Self::Ordered(FuturesOrdered::new())
        } else {
            Self::Unordered(FuturesUnordered::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Ordered(queue) => queue.len(),
            Self::Unordered(set) => set.len(),
        }
    }

    fn push(&mut self, handle: JoinHandle<T>) {
        match self {
            Self::Ordered(queue) => queue.push_back(handle),
            Self::Unordered(set) => set.push(handle),
        }
    }

    async fn next(&mut self) -> Option<std::result::Result<T, JoinError>> {
        match self {
            Self::Ordered(queue) => queue.next().await,
            Self::Unordered(set) => set.next().await,
        }
    }
}

/// Drives a per-item async function over a source with bounded parallelism
pub struct PartitionedExecutor {
    options: PipelineOptions,
    counters: Arc<ProgressCounters>,
    progress_tx: Option<mpsc::UnboundedSender<ProgressMessage>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl PartitionedExecutor {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            counters: Arc::new(ProgressCounters::new()),
            progress_tx: None,
            shutdown: None,
        }
    }

    /// Enables progress messages; the stream ends when the run finishes
    pub fn with_progress(mut self) -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_tx = Some(tx);
        (self, rx)
    }

    /// Stops admitting batches once the receiver observes `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Shared counters, readable while the run is in progress
    pub fn counters(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Runs the pipeline to completion
    ///
    /// The per-item function returns `Ok(Some(output))` to emit,
    /// `Ok(None)` to skip, or an error.
    ///
    /// # Errors
    ///
    /// Source and sink errors always abort the run. Item errors abort it
    /// only when `skip_failed_item` is off. On abort no further batch is
    /// delivered, in-flight batches are awaited and discarded, and
    /// `complete` is not called.
    pub async fn run<S, K, F, Fut>(
        self,
        source: &mut S,
        sink: &mut K,
        func: F,
    ) -> Result<PipelineSummary>
    where
        S: Source,
        K: Sink,
        F: Fn(S::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<K::Item>>> + Send + 'static,
    {
        self.options.validate()?;
        let start = Instant::now();
        let func = Arc::new(func);
        let mut in_flight = InFlight::new(self.options.keep_order);
        let mut summary = PipelineSummary::new();
        let mut failure: Option<VeilError> = None;
        let mut next_index: u64 = 0;

        tracing::info!(
            batch_size = self.options.batch_size,
            partition_count = self.options.partition_count,
            keep_order = self.options.keep_order,
            skip_failed_item = self.options.skip_failed_item,
            "Starting pipeline"
        );

        'admit: loop {
            if self.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            while in_flight.len() >= self.options.partition_count {
                let Some(joined) = in_flight.next().await else {
                    break;
                };
                if let Err(e) = self.deliver(joined, sink, &mut summary).await {
                    failure = Some(e);
                    break 'admit;
                }
                if self.is_cancelled() {
                    summary.interrupted = true;
                    break 'admit;
                }
            }

            let (batch, exhausted) = match self.read_batch(source).await {
                Ok(read) => read,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            if !batch.is_empty() {
                let index = next_index;
                next_index += 1;
                let worker_id = (index % self.options.partition_count as u64) as usize;
                summary.total_read += batch.len() as u64;
                self.counters.add_read(batch.len() as u64);
                in_flight.push(tokio::spawn(process_batch(
                    index,
                    worker_id,
                    batch,
                    Arc::clone(&func),
                    self.options.skip_failed_item,
                )));
            }
            if exhausted {
                break;
            }
        }

        while let Some(joined) = in_flight.next().await {
            if failure.is_some() {
                continue;
            }
            if let Err(e) = self.deliver(joined, sink, &mut summary).await {
                failure = Some(e);
            }
        }

        if let Some(err) = failure {
            crate::log_error_with_context!(&err, "Pipeline aborted");
            return Err(err);
        }

        sink.complete().await?;

        if summary.interrupted {
            tracing::warn!(
                delivered_batches = summary.batches,
                "Pipeline interrupted by shutdown signal"
            );
        }
        crate::log_pipeline_complete!(summary.completed, start.elapsed());
        Ok(summary.with_duration(start.elapsed()))
    }

    async fn read_batch<S: Source>(&self, source: &mut S) -> Result<(Vec<S::Item>, bool)> {
        let mut batch = Vec::with_capacity(self.options.batch_size);
        while batch.len() < self.options.batch_size {
            match source.next().await? {
                Some(item) => batch.push(item),
                None => return Ok((batch, true)),
            }
        }
        Ok((batch, false))
    }

    async fn deliver<K: Sink>(
        &self,
        joined: std::result::Result<BatchOutput<K::Item>, JoinError>,
        sink: &mut K,
        summary: &mut PipelineSummary,
    ) -> Result<()> {
        let batch = joined.map_err(|e| VeilError::Pipeline(format!("batch worker failed: {e}")))?;
        if let Some(err) = batch.fatal {
            return Err(err);
        }

        let completed = batch.outputs.len() as u64;
        if !batch.outputs.is_empty() {
            sink.consume(batch.outputs).await?;
        }

        summary.completed += completed;
        summary.skipped += batch.skipped;
        summary.failed += batch.failed;
        summary.batches += 1;
        summary.add_errors(batch.errors);
        self.counters
            .record_batch(completed, batch.skipped, batch.failed);

        if let Some(tx) = &self.progress_tx {
            // a dropped reporter is not an error
            let _ = tx.send(ProgressMessage {
                worker_id: batch.worker_id,
                batch_index: batch.index,
                batch_completed: completed,
                batch_skipped: batch.skipped,
                batch_failed: batch.failed,
                totals: self.counters.snapshot(),
            });
        }
        Ok(())
    }
}

async fn process_batch<I, O, F, Fut>(
    index: u64,
    worker_id: usize,
    items: Vec<I>,
    func: Arc<F>,
    skip_failed_item: bool,
) -> BatchOutput<O>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<Option<O>>>,
{
    let mut output = BatchOutput {
        index,
        worker_id,
        outputs: Vec::with_capacity(items.len()),
        skipped: 0,
        failed: 0,
        errors: Vec::new(),
        fatal: None,
    };

    for (offset, item) in items.into_iter().enumerate() {
        match (*func)(item).await {
            Ok(Some(value)) => output.outputs.push(value),
            Ok(None) => output.skipped += 1,
            Err(e) if skip_failed_item => {
                crate::log_item_excluded!(index, offset, &e);
                output.failed += 1;
                output.errors.push(format!("batch {index} item {offset}: {e}"));
            }
            Err(e) => {
                output.fatal = Some(e);
                break;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::{CollectSink, IterSource};
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn options(batch_size: usize, partition_count: usize, keep_order: bool) -> PipelineOptions {
        PipelineOptions {
            batch_size,
            partition_count,
            keep_order,
            skip_failed_item: true,
        }
    }

    async fn jitter() {
        let delay = rand::thread_rng().gen_range(0..3u64);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    #[tokio::test]
    async fn test_keep_order_preserves_source_order() {
        let mut source = IterSource::new(0..200u32);
        let mut sink = CollectSink::new();
        let summary = PartitionedExecutor::new(options(7, 4, true))
            .run(&mut source, &mut sink, |n| async move {
                jitter().await;
                Ok(Some(n))
            })
            .await
            .unwrap();

        assert_eq!(sink.items, (0..200).collect::<Vec<_>>());
        assert_eq!(summary.total_read, 200);
        assert_eq!(summary.completed, 200);
        assert_eq!(summary.batches, 29);
        assert!(sink.completed);
    }

    #[tokio::test]
    async fn test_unordered_delivers_everything() {
        let mut source = IterSource::new(0..200u32);
        let mut sink = CollectSink::new();
        let summary = PartitionedExecutor::new(options(10, 8, false))
            .run(&mut source, &mut sink, |n| async move {
                jitter().await;
                Ok(Some(n))
            })
            .await
            .unwrap();

        let mut items = sink.items.clone();
        items.sort_unstable();
        assert_eq!(items, (0..200).collect::<Vec<_>>());
        assert_eq!(summary.total_read, summary.completed);
    }

    #[tokio::test]
    async fn test_in_flight_bounded_by_partition_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));

        let mut source = IterSource::new(0..60u32);
        let mut sink = CollectSink::new();
        PartitionedExecutor::new(options(1, 3, true))
            .run(&mut source, &mut sink, move |n| {
                let (a, p) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok(Some(n))
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sink.items.len(), 60);
    }

    #[tokio::test]
    async fn test_skipped_and_failed_items_are_counted() {
        let mut source = IterSource::new(0..30u32);
        let mut sink = CollectSink::new();
        let summary = PartitionedExecutor::new(options(4, 2, true))
            .run(&mut source, &mut sink, |n| async move {
                match n % 10 {
                    0 => Ok(None),
                    1 => Err(VeilError::Format(format!("bad record {n}"))),
                    _ => Ok(Some(n)),
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.completed, 24);
        assert_eq!(summary.errors.len(), 3);
        assert!(!sink.items.iter().any(|n| n % 10 == 1));
    }

    #[tokio::test]
    async fn test_item_failure_aborts_without_skip() {
        let mut source = IterSource::new(0..100u32);
        let mut sink = CollectSink::new();
        let mut opts = options(5, 2, true);
        opts.skip_failed_item = false;

        let result = PartitionedExecutor::new(opts)
            .run(&mut source, &mut sink, |n| async move {
                if n == 42 {
                    Err(VeilError::Format("poisoned".to_string()))
                } else {
                    Ok(Some(n))
                }
            })
            .await;

        assert!(matches!(result, Err(VeilError::Format(_))));
        assert!(!sink.completed);
        assert!(sink.items.iter().all(|n| *n < 40));
        assert!(sink.batch_sizes.iter().all(|size| *size == 5));
    }

    #[tokio::test]
    async fn test_shutdown_before_start_reads_nothing() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let mut source = IterSource::new(0..10u32);
        let mut sink = CollectSink::new();
        let summary = PartitionedExecutor::new(options(2, 2, true))
            .with_shutdown(rx)
            .run(&mut source, &mut sink, |n| async move { Ok(Some(n)) })
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.total_read, 0);
        assert!(sink.completed);
    }

    #[tokio::test]
    async fn test_progress_messages_carry_worker_ids() {
        let mut source = IterSource::new(0..12u32);
        let mut sink = CollectSink::new();
        let (executor, mut progress) = PartitionedExecutor::new(options(3, 2, true)).with_progress();

        executor
            .run(&mut source, &mut sink, |n| async move { Ok(Some(n)) })
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Some(message) = progress.recv().await {
            messages.push(message);
        }
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages.iter().map(|m| m.worker_id).collect::<Vec<_>>(),
            vec![0, 1, 0, 1]
        );
        assert_eq!(messages.last().unwrap().totals.completed, 12);
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let mut source = IterSource::new(0..1u32);
        let mut sink = CollectSink::new();
        let result = PartitionedExecutor::new(options(0, 1, true))
            .run(&mut source, &mut sink, |n| async move { Ok(Some(n)) })
            .await;
        assert!(matches!(result, Err(VeilError::Configuration(_))));
    }
}
