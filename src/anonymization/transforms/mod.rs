//! Anonymization transforms
//!
//! Every transform works on one node of a [`RecordTree`] and reports what it
//! did through an [`Outcome`]. The engine decides which nodes a rule reaches;
//! transforms only decide what happens to the node they are handed.
//!
//! - [`redact`] - nulling with partial date/age/postal-code policies
//! - [`date_shift`] - per-entity deterministic day offsets
//! - [`crypto_hash`] - keyed HMAC digests
//! - [`encrypt`] - AES-CBC with a random IV
//! - [`perturb`] - uniform numeric noise
//! - [`substitute`] - structural replacement
//! - [`generalize`] - predicate cases

pub mod crypto_hash;
pub mod date_shift;
pub mod encrypt;
pub mod generalize;
pub mod perturb;
pub mod redact;
pub mod substitute;

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::anonymization::context::OperationKind;
use crate::anonymization::rules::Method;
use crate::domain::{NodeId, RecordTree, Result};

pub use crypto_hash::CryptoHashSettings;
pub use date_shift::DateShiftSettings;
pub use encrypt::EncryptSettings;
pub use generalize::{GeneralizeSettings, OtherValues, Predicate};
pub use perturb::{FnSampler, NoiseSampler, PerturbSettings, RangeType, ThreadRngSampler};
pub use redact::RedactSettings;
pub use substitute::SubstituteSettings;

/// How the walk continues below a transformed node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Visit the node's children
    Descend,
    /// Skip the children; the node is gone
    Stop,
    /// Skip the children and mark the whole subtree processed
    ClaimSubtree,
}

/// Result of applying a transform to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Kind of change, `None` when the node was left as is
    pub kind: Option<OperationKind>,
    pub continuation: Continuation,
}

impl Outcome {
    pub fn unchanged() -> Self {
        Self {
            kind: None,
            continuation: Continuation::Descend,
        }
    }

    pub fn changed(kind: OperationKind) -> Self {
        Self {
            kind: Some(kind),
            continuation: Continuation::Descend,
        }
    }

    pub fn removed() -> Self {
        Self {
            kind: Some(OperationKind::Removed),
            continuation: Continuation::Stop,
        }
    }

    pub fn claim_subtree(mut self) -> Self {
        self.continuation = Continuation::ClaimSubtree;
        self
    }

    pub fn claims_subtree(&self) -> bool {
        self.continuation == Continuation::ClaimSubtree
    }
}

/// Per-record inputs shared by all transforms
#[derive(Clone, Copy)]
pub struct TransformContext<'a> {
    /// Reference date for age computations
    pub today: NaiveDate,
    /// Identity seeding the date-shift offset
    pub entity_id: &'a str,
    pub noise: &'a dyn NoiseSampler,
    /// Nodes already processed in this record
    pub visited: &'a HashSet<NodeId>,
}

/// Applies `method` to `node`
///
/// `Keep` and `Ner` leave the node untouched here; the engine collects NER
/// targets separately.
pub fn apply(
    method: &Method,
    tree: &mut RecordTree,
    node: NodeId,
    ctx: &TransformContext<'_>,
) -> Result<Outcome> {
    match method {
        Method::Redact(settings) => redact::redact(tree, node, settings, ctx.today),
        Method::DateShift(settings) => {
            date_shift::shift(tree, node, settings, ctx.entity_id, ctx.today)
        }
        Method::CryptoHash(settings) => crypto_hash::hash(tree, node, settings),
        Method::Encrypt(settings) => encrypt::encrypt(tree, node, settings),
        Method::Perturb(settings) => perturb::perturb(tree, node, settings, ctx.noise),
        Method::Substitute(settings) => {
            substitute::substitute(tree, node, settings, ctx.visited)
        }
        Method::Generalize(settings) => generalize::generalize(tree, node, settings),
        Method::Remove => {
            if tree.parent(node).is_none() {
                return Ok(Outcome::unchanged());
            }
            tree.detach(node);
            Ok(Outcome::removed())
        }
        Method::Keep | Method::Ner => Ok(Outcome::unchanged()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Node, RecordFormat, Scalar};

    #[test]
    fn test_remove_detaches_and_stops() {
        let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new("Patient", "Patient"));
        let root = tree.root();
        let photo = tree.add_child(root, Node::new("photo", "Attachment"));
        tree.add_child(photo, Node::leaf("url", "url", Scalar::from("http://x")));

        let visited = HashSet::new();
        let ctx = TransformContext {
            today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            entity_id: "",
            noise: &ThreadRngSampler,
            visited: &visited,
        };
        let outcome = apply(&Method::Remove, &mut tree, photo, &ctx).unwrap();
        assert_eq!(outcome, Outcome::removed());
        assert!(!tree.is_attached(photo));

        let keep = apply(&Method::Keep, &mut tree, root, &ctx).unwrap();
        assert_eq!(keep, Outcome::unchanged());
    }
}
