//! Semantic classification of node types
//!
//! Transforms decide what to do with a node from its `type_name` alone. FHIR
//! type names and DICOM value representations are mapped onto one small
//! vocabulary here.

use super::dates::DateStyle;

/// What a transform may assume about a node's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Calendar date or date-time
    Date(DateStyle),
    /// FHIR `Age` complex type
    Age,
    /// DICOM AS age string
    AgeString,
    /// Postal code string
    PostalCode,
    /// Signed integer
    Integer,
    /// Non-negative integer
    Unsigned,
    /// Decimal number
    Decimal,
    /// Boolean flag
    Boolean,
    /// Quantity family complex type, whose `value` child is numeric
    Quantity,
    /// Any other primitive text
    Text,
    /// Complex node without scalar semantics
    Complex,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Unsigned | Self::Decimal)
    }

    pub fn is_date(self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// FHIR types whose numeric `value` child Perturb operates on
pub const QUANTITY_TYPES: &[&str] = &[
    "Quantity",
    "SimpleQuantity",
    "Age",
    "Count",
    "Distance",
    "Duration",
    "Money",
];

/// Classifies a FHIR type name or DICOM VR
pub fn classify(type_name: &str) -> ValueKind {
    match type_name {
        "date" => ValueKind::Date(DateStyle::FhirDate),
        "dateTime" | "instant" => ValueKind::Date(DateStyle::FhirDateTime),
        "Age" => ValueKind::Age,
        "postalCode" => ValueKind::PostalCode,
        "integer" | "integer64" => ValueKind::Integer,
        "positiveInt" | "unsignedInt" => ValueKind::Unsigned,
        "decimal" => ValueKind::Decimal,
        "boolean" => ValueKind::Boolean,
        t if QUANTITY_TYPES.contains(&t) => ValueKind::Quantity,

        "DA" => ValueKind::Date(DateStyle::DicomDate),
        "DT" => ValueKind::Date(DateStyle::DicomDateTime),
        "AS" => ValueKind::AgeString,
        "IS" | "SS" | "SL" | "SV" => ValueKind::Integer,
        "US" | "UL" | "UV" => ValueKind::Unsigned,
        "DS" | "FL" | "FD" => ValueKind::Decimal,
        "SQ" => ValueKind::Complex,

        t if t.chars().next().is_some_and(|c| c.is_ascii_uppercase()) && !is_dicom_vr(t) => {
            ValueKind::Complex
        }
        _ => ValueKind::Text,
    }
}

/// DICOM value representations
pub const DICOM_VRS: &[&str] = &[
    "AE", "AS", "AT", "CS", "DA", "DS", "DT", "FD", "FL", "IS", "LO", "LT", "OB", "OD", "OF", "OL",
    "OV", "OW", "PN", "SH", "SL", "SQ", "SS", "ST", "SV", "TM", "UC", "UI", "UL", "UN", "UR", "US",
    "UT", "UV",
];

pub fn is_dicom_vr(text: &str) -> bool {
    DICOM_VRS.contains(&text)
}
