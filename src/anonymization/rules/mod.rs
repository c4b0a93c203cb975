//! Anonymization rules
//!
//! - [`selector`] - selector grammar
//! - [`path_query`] - path expressions with predicates
//! - [`compiler`] - descriptors to immutable compiled rules
//! - [`matcher`] - which rule applies to which node
//! - [`validator`] - batch validation, optionally against the FHIR schema

pub mod compiler;
pub mod matcher;
pub mod path_query;
pub mod selector;
pub mod validator;

pub use compiler::{compile, compile_with, CompiledRule, CompiledRules, Method};
pub use matcher::RecordMatcher;
pub use selector::Selector;
pub use validator::{validate_config, validate_rules};
