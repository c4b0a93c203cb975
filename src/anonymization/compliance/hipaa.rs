//! HIPAA Safe Harbor constants and FHIR preset

use crate::anonymization::config::RuleDescriptor;

/// Ages above this many years are always redacted
pub const SAFE_HARBOR_AGE_THRESHOLD: i32 = 89;

/// Three-digit ZIP prefixes whose population is 20,000 or fewer
///
/// 2010 census list; these prefixes must be reported as `000`.
pub const HIPAA_RESTRICTED_ZIP3: &[&str] = &[
    "036", "059", "102", "203", "205", "369", "556", "692", "753", "772", "821", "823", "830",
    "831", "878", "879", "884", "890", "893",
];

/// Safe Harbor rule set for FHIR resources
///
/// Exact rules come first so that they claim their fields before the
/// broader type rules reach them.
pub fn safe_harbor_rules() -> Vec<RuleDescriptor> {
    vec![
        RuleDescriptor::new("Patient.address.state", "keep"),
        RuleDescriptor::new("Patient.address.country", "keep"),
        RuleDescriptor::new("Patient.address.postalCode", "redact"),
        RuleDescriptor::new("Resource.text", "remove"),
        RuleDescriptor::new("Patient.photo", "remove"),
        RuleDescriptor::new("nodesByType('HumanName')", "redact"),
        RuleDescriptor::new("nodesByType('Address')", "redact"),
        RuleDescriptor::new("nodesByType('ContactPoint')", "redact"),
        RuleDescriptor::new("nodesByType('Identifier')", "redact"),
        RuleDescriptor::new("nodesByType('Reference').display", "redact"),
        RuleDescriptor::new("nodesByType('Age')", "redact"),
        RuleDescriptor::new("nodesByType('date')", "dateshift"),
        RuleDescriptor::new("nodesByType('dateTime')", "dateshift"),
        RuleDescriptor::new("nodesByType('instant')", "dateshift"),
    ]
}
