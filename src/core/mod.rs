//! Core business logic for Veil.
//!
//! # Modules
//!
//! - [`pipeline`] - Partitioned batch execution over record streams
//!
//! # Pipeline Workflow
//!
//! 1. **Read**: pull up to `batch_size` records from a [`pipeline::Source`]
//! 2. **Dispatch**: hand the batch to a worker task while at most
//!    `partition_count` batches are in flight
//! 3. **Anonymize**: each worker calls the engine once per record
//! 4. **Deliver**: completed batches reach the [`pipeline::Sink`] whole,
//!    in source order unless ordering is disabled
//! 5. **Report**: counters and progress messages, then a
//!    [`pipeline::PipelineSummary`]
//!
//! # Example
//!
//! ```rust,no_run
//! use veil::adapters::ndjson::{NdjsonSink, NdjsonSource};
//! use veil::core::pipeline::{PartitionedExecutor, PipelineOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = NdjsonSource::open("patients.ndjson").await?;
//! let mut sink = NdjsonSink::create("patients.anon.ndjson").await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let executor = PartitionedExecutor::new(PipelineOptions::default()).with_shutdown(shutdown_rx);
//!
//! let summary = executor
//!     .run(&mut source, &mut sink, |line| async move { Ok(Some(line)) })
//!     .await?;
//!
//! println!("Completed: {}", summary.completed);
//! println!("Failed: {}", summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
