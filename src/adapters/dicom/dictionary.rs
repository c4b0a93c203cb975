//! DICOM data dictionary subset
//!
//! Keyword, tag and VR of the attributes de-identification profiles usually
//! touch. Unknown tags still load; they carry the VR from the JSON model.

use crate::domain::Tag;

/// One dictionary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub keyword: &'static str,
    pub tag: Tag,
    pub vr: &'static str,
}

const fn entry(keyword: &'static str, group: u16, element: u16, vr: &'static str) -> DictionaryEntry {
    DictionaryEntry {
        keyword,
        tag: Tag::new(group, element),
        vr,
    }
}

pub const PATIENT_IDENTITY_REMOVED: Tag = Tag::new(0x0012, 0x0062);
pub const DEIDENTIFICATION_METHOD: Tag = Tag::new(0x0012, 0x0063);
pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);

const ENTRIES: &[DictionaryEntry] = &[
    entry("InstanceCreationDate", 0x0008, 0x0012, "DA"),
    entry("SOPClassUID", 0x0008, 0x0016, "UI"),
    entry("SOPInstanceUID", 0x0008, 0x0018, "UI"),
    entry("StudyDate", 0x0008, 0x0020, "DA"),
    entry("SeriesDate", 0x0008, 0x0021, "DA"),
    entry("AcquisitionDate", 0x0008, 0x0022, "DA"),
    entry("ContentDate", 0x0008, 0x0023, "DA"),
    entry("AcquisitionDateTime", 0x0008, 0x002A, "DT"),
    entry("StudyTime", 0x0008, 0x0030, "TM"),
    entry("AccessionNumber", 0x0008, 0x0050, "SH"),
    entry("Modality", 0x0008, 0x0060, "CS"),
    entry("InstitutionName", 0x0008, 0x0080, "LO"),
    entry("InstitutionAddress", 0x0008, 0x0081, "ST"),
    entry("ReferringPhysicianName", 0x0008, 0x0090, "PN"),
    entry("StationName", 0x0008, 0x1010, "SH"),
    entry("StudyDescription", 0x0008, 0x1030, "LO"),
    entry("SeriesDescription", 0x0008, 0x103E, "LO"),
    entry("PerformingPhysicianName", 0x0008, 0x1050, "PN"),
    entry("OperatorsName", 0x0008, 0x1070, "PN"),
    entry("ReferencedStudySequence", 0x0008, 0x1110, "SQ"),
    entry("ReferencedImageSequence", 0x0008, 0x1140, "SQ"),
    entry("ReferencedSOPClassUID", 0x0008, 0x1150, "UI"),
    entry("ReferencedSOPInstanceUID", 0x0008, 0x1155, "UI"),
    entry("PatientIdentityRemoved", 0x0012, 0x0062, "CS"),
    entry("DeidentificationMethod", 0x0012, 0x0063, "LO"),
    entry("PatientName", 0x0010, 0x0010, "PN"),
    entry("PatientID", 0x0010, 0x0020, "LO"),
    entry("IssuerOfPatientID", 0x0010, 0x0021, "LO"),
    entry("PatientBirthDate", 0x0010, 0x0030, "DA"),
    entry("PatientBirthTime", 0x0010, 0x0032, "TM"),
    entry("PatientSex", 0x0010, 0x0040, "CS"),
    entry("OtherPatientIDs", 0x0010, 0x1000, "LO"),
    entry("OtherPatientNames", 0x0010, 0x1001, "PN"),
    entry("PatientAge", 0x0010, 0x1010, "AS"),
    entry("PatientSize", 0x0010, 0x1020, "DS"),
    entry("PatientWeight", 0x0010, 0x1030, "DS"),
    entry("PatientAddress", 0x0010, 0x1040, "LO"),
    entry("PatientMotherBirthName", 0x0010, 0x1060, "PN"),
    entry("MedicalRecordLocator", 0x0010, 0x1090, "LO"),
    entry("CountryOfResidence", 0x0010, 0x2150, "LO"),
    entry("RegionOfResidence", 0x0010, 0x2152, "LO"),
    entry("PatientTelephoneNumbers", 0x0010, 0x2154, "SH"),
    entry("EthnicGroup", 0x0010, 0x2160, "SH"),
    entry("Occupation", 0x0010, 0x2180, "SH"),
    entry("AdditionalPatientHistory", 0x0010, 0x21B0, "LT"),
    entry("PatientComments", 0x0010, 0x4000, "LT"),
    entry("SliceThickness", 0x0018, 0x0050, "DS"),
    entry("DeviceSerialNumber", 0x0018, 0x1000, "LO"),
    entry("ProtocolName", 0x0018, 0x1030, "LO"),
    entry("StudyInstanceUID", 0x0020, 0x000D, "UI"),
    entry("SeriesInstanceUID", 0x0020, 0x000E, "UI"),
    entry("StudyID", 0x0020, 0x0010, "SH"),
    entry("SeriesNumber", 0x0020, 0x0011, "IS"),
    entry("InstanceNumber", 0x0020, 0x0013, "IS"),
    entry("FrameOfReferenceUID", 0x0020, 0x0052, "UI"),
    entry("Rows", 0x0028, 0x0010, "US"),
    entry("Columns", 0x0028, 0x0011, "US"),
    entry("ScheduledProcedureStepID", 0x0040, 0x0009, "SH"),
    entry("PerformedProcedureStepStartDate", 0x0040, 0x0244, "DA"),
    entry("RequestAttributesSequence", 0x0040, 0x0275, "SQ"),
    entry("RequestedProcedureID", 0x0040, 0x1001, "SH"),
    entry("PixelData", 0x7FE0, 0x0010, "OW"),
];

/// Looks up an attribute by keyword (case-sensitive, as in PS3.6)
pub fn by_keyword(keyword: &str) -> Option<&'static DictionaryEntry> {
    ENTRIES.iter().find(|e| e.keyword == keyword)
}

/// Looks up an attribute by tag
pub fn by_tag(tag: Tag) -> Option<&'static DictionaryEntry> {
    ENTRIES.iter().find(|e| e.tag == tag)
}
