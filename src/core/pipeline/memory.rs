//! In-memory source and sink
//!
//! Useful for library callers that already hold their records, and for tests.

use super::traits::{Sink, Source};
use crate::domain::Result;
use async_trait::async_trait;

/// Source over any owned iterator
pub struct IterSource<I: Iterator> {
    inner: I,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: items.into_iter(),
        }
    }
}

#[async_trait]
impl<I> Source for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn next(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.inner.next())
    }
}

/// Sink collecting every consumed item
#[derive(Debug)]
pub struct CollectSink<T> {
    pub items: Vec<T>,
    /// Size of every consumed batch, in consumption order
    pub batch_sizes: Vec<usize>,
    pub completed: bool,
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            batch_sizes: Vec::new(),
            completed: false,
        }
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Sink for CollectSink<T> {
    type Item = T;

    async fn consume(&mut self, batch: Vec<T>) -> Result<()> {
        self.batch_sizes.push(batch.len());
        self.items.extend(batch);
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.completed = true;
        Ok(())
    }
}
