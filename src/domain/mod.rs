//! Domain models and types for Veil.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Record tree** ([`RecordTree`], [`Node`], [`NodeId`]): the format-neutral
//!   arena both FHIR resources and DICOM datasets are loaded into
//! - **Partial dates** ([`PartialDate`]) with precision-preserving shifting
//! - **Semantic classification** ([`ValueKind`]) of FHIR types and DICOM VRs
//! - **Error types** ([`VeilError`], [`ConfigurationError`], [`SelectorError`], [`CryptoError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, VeilError>`]:
//!
//! ```rust
//! use veil::domain::{Node, RecordFormat, RecordTree, Result};
//!
//! fn example() -> Result<()> {
//!     let tree = RecordTree::new(RecordFormat::Fhir, Node::new("Patient", "Patient"));
//!     assert_eq!(tree.path(tree.root()), "Patient");
//!     Ok(())
//! }
//! ```

pub mod dates;
pub mod errors;
pub mod result;
pub mod semantic;
pub mod tree;

pub use dates::{DateStyle, PartialDate};
pub use errors::{
    ConfigurationError, CryptoError, RuleViolation, SelectorError, ValidationReport, VeilError,
};
pub use result::Result;
pub use semantic::{classify, ValueKind};
pub use tree::{Node, NodeId, RecordFormat, RecordTree, Scalar, Tag};
