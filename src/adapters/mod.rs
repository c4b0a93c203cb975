//! Format and I/O adapters for Veil.
//!
//! This module isolates everything format-specific from the engine, which
//! only sees [`RecordTree`](crate::domain::RecordTree)s:
//!
//! - [`fhir`] - FHIR JSON resources, bundles and the built-in field-type graph
//! - [`dicom`] - DICOM JSON model datasets and the keyword dictionary
//! - [`ndjson`] - line-delimited file [`Source`](crate::core::pipeline::Source)
//!   and [`Sink`](crate::core::pipeline::Sink)
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use veil::adapters::{from_json, to_json};
//! use veil::domain::RecordFormat;
//!
//! # fn example() -> veil::domain::Result<()> {
//! let resource = json!({"resourceType": "Patient", "id": "p1"});
//! let tree = from_json(&resource, RecordFormat::Fhir)?;
//! assert_eq!(to_json(&tree)?, resource);
//! # Ok(())
//! # }
//! ```

pub mod dicom;
pub mod fhir;
pub mod ndjson;

use crate::domain::{RecordFormat, RecordTree, Result};
use serde_json::Value;

/// Loads a JSON record in the given format
pub fn from_json(value: &Value, format: RecordFormat) -> Result<RecordTree> {
    match format {
        RecordFormat::Fhir => fhir::from_json(value),
        RecordFormat::Dicom => dicom::from_json(value),
    }
}

/// Serializes a record tree in its own format
pub fn to_json(tree: &RecordTree) -> Result<Value> {
    match tree.format() {
        RecordFormat::Fhir => fhir::to_json(tree),
        RecordFormat::Dicom => dicom::to_json(tree),
    }
}
