//! Source and sink abstractions for the partitioned pipeline

use crate::domain::Result;
use async_trait::async_trait;

/// Pull-based record source
///
/// `next` returns `Ok(None)` once exhausted. Errors are pipeline-level and
/// abort the run.
#[async_trait]
pub trait Source: Send {
    type Item: Send + 'static;

    async fn next(&mut self) -> Result<Option<Self::Item>>;
}

/// Batch-oriented record sink
///
/// `consume` receives every batch exactly once and whole; `complete` is
/// called once after the last batch of a successful run.
#[async_trait]
pub trait Sink: Send {
    type Item: Send + 'static;

    async fn consume(&mut self, batch: Vec<Self::Item>) -> Result<()>;

    async fn complete(&mut self) -> Result<()>;
}
