//! Anonymization module for Veil
//!
//! This module de-identifies FHIR resources and DICOM datasets by applying
//! configured rules to the nodes of a [`RecordTree`](crate::domain::RecordTree).
//!
//! # Architecture
//!
//! - **Rules**: descriptor compilation, selector matching and validation
//! - **Transforms**: redact, date shift, crypto hash, encrypt, perturb,
//!   substitute, generalize, remove, keep
//! - **Engine**: per-record traversal, conflict resolution, security labels
//! - **Compliance**: HIPAA Safe Harbor and DICOM basic profile presets
//! - **Audit**: structured logging with hashed record ids
//!
//! # Usage
//!
//! ```rust,ignore
//! use veil::anonymization::{AnonymizationEngine, config::AnonymizationConfig};
//!
//! let config = AnonymizationConfig::default();
//! let engine = AnonymizationEngine::new(&config)?;
//! let anonymized = engine.anonymize_json(resource, RecordFormat::Fhir).await?;
//! ```

pub mod audit;
pub mod compliance;
pub mod config;
pub mod context;
pub mod engine;
pub mod labels;
pub mod ner;
pub mod rules;
pub mod transforms;

// Re-export main types
pub use config::AnonymizationConfig;
pub use context::{OperationKind, ProcessResult};
pub use engine::{AnonymizationEngine, AnonymizedRecord, EngineBuilder};
pub use ner::TextAnonymizer;
