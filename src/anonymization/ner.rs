//! Named-entity recognition hand-off
//!
//! Free text matched by `ner` rules is sent to an external service in one
//! batch per top-level record. Veil ships no recognizer of its own; callers
//! inject an implementation of [`TextAnonymizer`].

use async_trait::async_trait;

use crate::domain::Result;

/// External free-text anonymizer
///
/// Implementations must return exactly one output per input, in input order.
#[async_trait]
pub trait TextAnonymizer: Send + Sync {
    async fn anonymize_text(&self, texts: Vec<String>) -> Result<Vec<String>>;
}
