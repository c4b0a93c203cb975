//! FHIR JSON adapter
//!
//! - [`schema`] - built-in field-type graph used for typing and rule validation
//! - [`convert`] - JSON ⇄ [`RecordTree`](crate::domain::RecordTree) conversion

pub mod convert;
pub mod schema;

pub use convert::{fragment_from_json, from_json, to_json};
pub use schema::FhirSchema;

/// Code system of de-identification security labels
pub const SECURITY_LABEL_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/v3-ObservationValue";
