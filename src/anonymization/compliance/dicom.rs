//! DICOM basic application confidentiality profile subset

use crate::anonymization::config::RuleDescriptor;

/// Tag rules for patient, study and equipment identity
pub fn basic_profile_rules() -> Vec<RuleDescriptor> {
    vec![
        RuleDescriptor::new("PatientBirthDate", "dateshift"),
        RuleDescriptor::new("StudyDate", "dateshift"),
        RuleDescriptor::new("SeriesDate", "dateshift"),
        RuleDescriptor::new("AcquisitionDate", "dateshift"),
        RuleDescriptor::new("ContentDate", "dateshift"),
        RuleDescriptor::new("AcquisitionDateTime", "dateshift"),
        RuleDescriptor::new("PatientAge", "redact"),
        RuleDescriptor::new("(0010,0020)", "redact"),
        RuleDescriptor::new("OtherPatientIDs", "remove"),
        RuleDescriptor::new("AccessionNumber", "redact"),
        RuleDescriptor::new("InstitutionName", "remove"),
        RuleDescriptor::new("InstitutionAddress", "remove"),
        RuleDescriptor::new("PatientAddress", "remove"),
        RuleDescriptor::new("PatientTelephoneNumbers", "remove"),
        RuleDescriptor::new("DeviceSerialNumber", "remove"),
        RuleDescriptor::new("PatientComments", "remove"),
        RuleDescriptor::new("(50xx,xxxx)", "remove"),
        RuleDescriptor::new("(60xx,3000)", "remove"),
        RuleDescriptor::new("PN", "redact"),
    ]
}
