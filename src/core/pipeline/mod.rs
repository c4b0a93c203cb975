//! Partitioned concurrent execution pipeline
//!
//! This module drives a per-item async function (normally one
//! anonymization-engine call per record) over a large record stream:
//! - [`traits`] - [`Source`] and [`Sink`] abstractions
//! - [`executor`] - bounded in-flight window, ordering, failure policy
//! - [`progress`] - atomic counters and the progress channel
//! - [`summary`] - run outcome reporting
//! - [`memory`] - in-memory source and sink

pub mod executor;
pub mod memory;
pub mod progress;
pub mod summary;
pub mod traits;

pub use executor::{PartitionedExecutor, PipelineOptions};
pub use memory::{CollectSink, IterSource};
pub use progress::{
    spawn_progress_reporter, ProgressCounters, ProgressMessage, ProgressSnapshot, ProgressStream,
};
pub use summary::PipelineSummary;
pub use traits::{Sink, Source};
