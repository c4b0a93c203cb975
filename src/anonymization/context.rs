//! Per-record processing state and results

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::domain::{NodeId, Scalar};

/// Kind of change a transform made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Redacted,
    PartiallyRedacted,
    Removed,
    DateShifted,
    Perturbed,
    CryptoHashed,
    Encrypted,
    Substituted,
    Generalized,
    TextAnonymized,
}

impl OperationKind {
    /// v3 ObservationValue code written as a security label
    pub fn security_label(self) -> &'static str {
        match self {
            Self::Redacted | Self::Removed => "REDACTED",
            Self::PartiallyRedacted | Self::Generalized | Self::TextAnonymized => "ABSTRED",
            Self::CryptoHashed => "CRYTOHASH",
            Self::Encrypted => "MASKED",
            Self::DateShifted | Self::Perturbed => "PERTURBED",
            Self::Substituted => "SUBSTITUTED",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Redacted => "redacted",
            Self::PartiallyRedacted => "partially_redacted",
            Self::Removed => "removed",
            Self::DateShifted => "date_shifted",
            Self::Perturbed => "perturbed",
            Self::CryptoHashed => "crypto_hashed",
            Self::Encrypted => "encrypted",
            Self::Substituted => "substituted",
            Self::Generalized => "generalized",
            Self::TextAnonymized => "text_anonymized",
        };
        f.write_str(text)
    }
}

/// Applied operations of a subtree, with per-kind node counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    counts: BTreeMap<OperationKind, u64>,
}

impl ProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one node changed by `kind`
    pub fn record(&mut self, kind: OperationKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    /// Set union, summing counts
    pub fn merge(&mut self, other: &ProcessResult) {
        for (kind, count) in &other.counts {
            *self.counts.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.counts.contains_key(&kind)
    }

    pub fn count(&self, kind: OperationKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Applied kinds in a stable order
    pub fn kinds(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.counts.keys().copied()
    }

    pub fn counts(&self) -> &BTreeMap<OperationKind, u64> {
        &self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Distinct security label codes, in first-seen kind order
    pub fn security_labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        for kind in self.kinds() {
            let label = kind.security_label();
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        labels
    }

    /// Total changed nodes
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Visited set and original values for one top-level record
#[derive(Debug, Default)]
pub struct ProcessContext {
    visited: HashSet<NodeId>,
    originals: HashMap<NodeId, Option<Scalar>>,
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visited(&self, id: NodeId) -> bool {
        self.visited.contains(&id)
    }

    pub fn mark_visited(&mut self, id: NodeId) {
        self.visited.insert(id);
    }

    pub fn visited(&self) -> &HashSet<NodeId> {
        &self.visited
    }

    /// Remembers the value a node had before its first change
    pub fn remember(&mut self, id: NodeId, value: Option<Scalar>) {
        self.originals.entry(id).or_insert(value);
    }

    /// Pre-anonymization value, when the node was changed
    pub fn original(&self, id: NodeId) -> Option<&Option<Scalar>> {
        self.originals.get(&id)
    }
}
