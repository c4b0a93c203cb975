// Veil - FHIR and DICOM De-identification Tool
// Copyright (c) 2025 Veil Contributors
// Licensed under the MIT License

//! # Veil - FHIR and DICOM de-identification
//!
//! Veil removes or transforms protected health information in FHIR JSON
//! resources and DICOM JSON datasets according to an ordered list of
//! configurable rules.
//!
//! ## Overview
//!
//! This library provides:
//! - **Rules**: selector parsing and compilation (exact paths, type
//!   selectors, path queries, DICOM tags, keywords and VRs)
//! - **Transforms**: redact, keep, remove, date shift, crypto hash,
//!   encrypt, perturb, substitute, generalize and `ner` hand-off
//! - **Engine**: per-record traversal with first-rule-wins conflict
//!   resolution, exact-rule overrides and security labels
//! - **Pipeline**: bounded, partitioned concurrent processing of record streams
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`anonymization`] - Rule compiler, matcher, transforms and engine
//! - [`core`] - Partitioned pipeline
//! - [`adapters`] - FHIR, DICOM and NDJSON adapters
//! - [`domain`] - Record tree, dates, semantic types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use veil::anonymization::AnonymizationEngine;
//! use veil::config::load_config;
//! use veil::domain::RecordFormat;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("veil.toml")?;
//!     let engine = AnonymizationEngine::new(&config.anonymization)?;
//!
//!     let patient = json!({
//!         "resourceType": "Patient",
//!         "id": "example",
//!         "birthDate": "1974-12-25"
//!     });
//!     let anonymized = engine.anonymize_json(patient, RecordFormat::Fhir).await?;
//!     println!("{anonymized}");
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::Result`], whose error type is
//! [`domain::VeilError`]. Rule validation collects every violation into a
//! single [`domain::ValidationReport`].
//!
//! ## Logging
//!
//! Veil uses structured logging with the `tracing` crate. Logged fields
//! never include record values; audit entries carry a SHA-256 of the
//! record id.

pub mod adapters;
pub mod anonymization;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
