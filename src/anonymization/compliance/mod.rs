//! Compliance presets
//!
//! Starter rule sets used by `veil init` and safe-harbor constants used by
//! the transforms.
//!
//! # Presets
//!
//! ## HIPAA Safe Harbor
//!
//! FHIR rules covering the Safe Harbor identifier list (45 CFR
//! §164.514(b)(2)): names, geographic subdivisions, dates, contact points,
//! identifiers, URLs and photographs.
//!
//! ## DICOM basic profile
//!
//! Tag rules for the patient and study identity attributes of the DICOM
//! basic application confidentiality profile (PS3.15 E.1).
//!
//! # Examples
//!
//! ```
//! use veil::anonymization::compliance::ComplianceMode;
//!
//! let mode: ComplianceMode = "hipaa_safe_harbor".parse().unwrap();
//! assert_eq!(mode.to_string(), "hipaa_safe_harbor");
//! assert!(!mode.rules().is_empty());
//! ```

pub mod dicom;
pub mod hipaa;

pub use hipaa::{HIPAA_RESTRICTED_ZIP3, SAFE_HARBOR_AGE_THRESHOLD};

use crate::anonymization::config::RuleDescriptor;
use crate::domain::{RecordFormat, VeilError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Starter rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceMode {
    /// HIPAA Safe Harbor rules for FHIR resources
    #[default]
    HipaaSafeHarbor,

    /// DICOM basic application confidentiality profile subset
    DicomBasicProfile,
}

impl ComplianceMode {
    /// Record format the preset's selectors address
    pub fn format(self) -> RecordFormat {
        match self {
            Self::HipaaSafeHarbor => RecordFormat::Fhir,
            Self::DicomBasicProfile => RecordFormat::Dicom,
        }
    }

    /// Rules of the preset in application order
    pub fn rules(self) -> Vec<RuleDescriptor> {
        match self {
            Self::HipaaSafeHarbor => hipaa::safe_harbor_rules(),
            Self::DicomBasicProfile => dicom::basic_profile_rules(),
        }
    }
}

impl fmt::Display for ComplianceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HipaaSafeHarbor => write!(f, "hipaa_safe_harbor"),
            Self::DicomBasicProfile => write!(f, "dicom_basic_profile"),
        }
    }
}

impl FromStr for ComplianceMode {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "hipaa_safe_harbor" | "hipaa" => Ok(Self::HipaaSafeHarbor),
            "dicom_basic_profile" | "dicom" => Ok(Self::DicomBasicProfile),
            _ => Err(VeilError::Other(format!(
                "Invalid compliance preset: {s}. Expected 'hipaa_safe_harbor' or 'dicom_basic_profile'"
            ))),
        }
    }
}
