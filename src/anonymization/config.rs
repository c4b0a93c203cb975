//! Anonymization configuration
//!
//! Maps the `[anonymization]` section: the ordered rule list, engine-wide
//! parameters, named setting tables referenced by rules, and audit output.
//!
//! ```toml
//! [anonymization]
//! validate_schema = true
//!
//! [[anonymization.rules]]
//! selector = "Patient.birthDate"
//! method = "dateshift"
//!
//! [[anonymization.rules]]
//! selector = "nodesByType('Reference')"
//! method = "cryptohash"
//!
//! [[anonymization.rules]]
//! selector = "Observation.valueQuantity"
//! method = "perturb"
//! setting = "small_noise"
//!
//! [anonymization.parameters]
//! crypto_hash_key = "${VEIL_HASH_KEY}"
//! enable_partial_zip_codes_for_redact = true
//!
//! [anonymization.settings.small_noise]
//! span = 2
//! round_to = 1
//! ```

use crate::config::SecretString;
use crate::domain::{ConfigurationError, Result, VeilError};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Named setting tables, keyed by the name rules refer to with `setting = "<name>"`
pub type SharedSettings = BTreeMap<String, Map<String, Value>>;

/// One rule as written in configuration
///
/// `selector` and `method` are optional here so that the rule compiler can
/// report their absence with the rule's position. Every key not listed
/// below is an inline method setting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDescriptor {
    /// Selector text; `path` and `tag` are accepted as aliases
    #[serde(default, alias = "path", alias = "tag")]
    pub selector: Option<String>,

    /// Transform name
    #[serde(default)]
    pub method: Option<String>,

    /// Record type the rule is restricted to
    #[serde(default, alias = "resourceType")]
    pub resource_type: Option<String>,

    /// Tie-break among type rules, lower wins
    #[serde(default)]
    pub priority: Option<i32>,

    /// Name of a shared setting table merged under the inline settings
    #[serde(default)]
    pub setting: Option<String>,

    /// Inline method settings
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl RuleDescriptor {
    /// Convenience constructor for programmatic rule lists
    pub fn new(selector: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            method: Some(method.into()),
            ..Default::default()
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn scoped_to(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn using(mut self, setting: impl Into<String>) -> Self {
        self.setting = Some(setting.into());
        self
    }
}

/// Whose identity seeds the date-shift offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateShiftScope {
    /// Per record: the resource `id` or the DICOM PatientID
    #[default]
    Record,
    /// One offset for every record
    Global,
}

/// HMAC digest used by CryptoHash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(VeilError::invalid_settings(format!(
                "unknown hash algorithm '{s}' (expected sha256, sha384 or sha512)"
            ))),
        }
    }
}

/// Engine-wide transform parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Salt for the date-shift offset; empty when absent
    #[serde(default)]
    pub date_shift_key: Option<SecretString>,

    /// Maximum shift in days, in both directions
    #[serde(default = "default_date_shift_range")]
    pub date_shift_range: i64,

    #[serde(default)]
    pub date_shift_scope: DateShiftScope,

    /// HMAC key for CryptoHash
    #[serde(default)]
    pub crypto_hash_key: Option<SecretString>,

    #[serde(default)]
    pub crypto_hash_algorithm: HashAlgorithm,

    /// AES key for Encrypt; its UTF-8 length must be 16, 24 or 32 bytes
    #[serde(default)]
    pub encrypt_key: Option<SecretString>,

    #[serde(default)]
    pub enable_partial_ages_for_redact: bool,

    #[serde(default)]
    pub enable_partial_dates_for_redact: bool,

    #[serde(default)]
    pub enable_partial_zip_codes_for_redact: bool,

    /// Three-digit ZIP prefixes that are always fully zeroed
    #[serde(default = "default_restricted_zip_codes")]
    pub restricted_zip_code_tabulation_areas: Vec<String>,

    /// Keep a field's value and continue when its transform fails
    #[serde(default)]
    pub skip_failed_item: bool,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            date_shift_key: None,
            date_shift_range: default_date_shift_range(),
            date_shift_scope: DateShiftScope::default(),
            crypto_hash_key: None,
            crypto_hash_algorithm: HashAlgorithm::default(),
            encrypt_key: None,
            enable_partial_ages_for_redact: false,
            enable_partial_dates_for_redact: false,
            enable_partial_zip_codes_for_redact: false,
            restricted_zip_code_tabulation_areas: default_restricted_zip_codes(),
            skip_failed_item: false,
        }
    }
}

impl ParameterConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.date_shift_range <= 0 {
            return Err(format!(
                "anonymization.parameters.date_shift_range must be > 0, got {}",
                self.date_shift_range
            ));
        }

        if let Some(key) = &self.encrypt_key {
            let len = key.expose_secret().len();
            if ![16, 24, 32].contains(&len) {
                return Err(format!(
                    "anonymization.parameters.encrypt_key must be 16, 24 or 32 bytes, got {len}"
                ));
            }
        }

        for prefix in &self.restricted_zip_code_tabulation_areas {
            if prefix.len() != 3 || !prefix.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!(
                    "restricted_zip_code_tabulation_areas entry '{prefix}' must be three digits"
                ));
            }
        }

        Ok(())
    }
}

/// Main anonymization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnonymizationConfig {
    /// Ordered rule list; earlier rules claim fields first
    #[serde(default)]
    pub rules: Vec<RuleDescriptor>,

    #[serde(default)]
    pub parameters: ParameterConfig,

    /// Named setting tables
    #[serde(default)]
    pub settings: SharedSettings,

    /// Check path and type rules against the FHIR field-type graph
    #[serde(default)]
    pub validate_schema: bool,

    /// Audit logging configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AnonymizationConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.parameters.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Keys are only ever taken from the environment as a whole value, never
    /// logged.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        use crate::config::secret_string;

        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_DATE_SHIFT_KEY") {
            self.parameters.date_shift_key = Some(secret_string(val));
        }
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_CRYPTO_HASH_KEY") {
            self.parameters.crypto_hash_key = Some(secret_string(val));
        }
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_ENCRYPT_KEY") {
            self.parameters.encrypt_key = Some(secret_string(val));
        }
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_DATE_SHIFT_RANGE") {
            self.parameters.date_shift_range = val.parse().map_err(|_| {
                ConfigurationError::Invalid(format!(
                    "Invalid VEIL_ANONYMIZATION_DATE_SHIFT_RANGE value: {val}"
                ))
            })?;
        }
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_SKIP_FAILED_ITEM") {
            self.parameters.skip_failed_item = val.parse().map_err(|_| {
                ConfigurationError::Invalid(format!(
                    "Invalid VEIL_ANONYMIZATION_SKIP_FAILED_ITEM value: {val}"
                ))
            })?;
        }

        self.audit.apply_env_overrides()?;
        Ok(())
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging
    #[serde(default)]
    pub enabled: bool,

    /// Audit log file path
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,

    /// Use JSON format for audit logs
    #[serde(default = "default_audit_json_format")]
    pub json_format: bool,
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("./audit/anonymization.log")
}

fn default_audit_json_format() -> bool {
    true
}

fn default_date_shift_range() -> i64 {
    50
}

fn default_restricted_zip_codes() -> Vec<String> {
    crate::anonymization::compliance::HIPAA_RESTRICTED_ZIP3
        .iter()
        .map(|z| z.to_string())
        .collect()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
            json_format: default_audit_json_format(),
        }
    }
}

impl AuditConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.enabled && self.log_path.as_os_str().is_empty() {
            return Err("anonymization.audit.log_path must be set when audit is enabled".to_string());
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_AUDIT_ENABLED") {
            self.enabled = val.parse().map_err(|_| {
                ConfigurationError::Invalid(format!(
                    "Invalid VEIL_ANONYMIZATION_AUDIT_ENABLED value: {val}"
                ))
            })?;
        }
        if let Ok(val) = std::env::var("VEIL_ANONYMIZATION_AUDIT_LOG_PATH") {
            self.log_path = PathBuf::from(val);
        }
        Ok(())
    }
}
