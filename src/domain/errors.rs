//! Domain error types
//!
//! This module defines the error hierarchy for Veil. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Veil error type
///
/// This is the primary error type used throughout the library. Configuration
/// and schema validation problems are reported in batch through
/// [`VeilError::Validation`]; everything else fails fast.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Missing, unsupported or invalid rule or settings
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Unparseable or ambiguous selector
    #[error("Selector error: {0}")]
    Selector(#[from] SelectorError),

    /// Malformed input document, ciphertext or encoded value
    #[error("Format error: {0}")]
    Format(String),

    /// Key size, encryption or decryption failures
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A transform failed while mutating a node
    #[error("Rule application error: rule '{rule}' at '{path}': {message}")]
    RuleApplication {
        rule: String,
        path: String,
        message: String,
    },

    /// Batched configuration/schema validation report
    #[error("Validation failed with {} violation(s):\n{}", .0.len(), .0)]
    Validation(ValidationReport),

    /// Pipeline execution failures (worker panics, channel loss)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Rule and settings configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required descriptor field is absent
    #[error("Missing required field '{field}' in rule #{rule_index}")]
    MissingField { rule_index: usize, field: String },

    /// Method name is not recognized
    #[error("Unsupported anonymization method '{0}'")]
    UnsupportedMethod(String),

    /// Method settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Any other configuration problem
    #[error("{0}")]
    Invalid(String),
}

/// Selector parsing errors
#[derive(Debug, Error)]
pub enum SelectorError {
    /// None of the selector forms accepted the text
    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    /// The selector parsed but can be read more than one way
    #[error("Ambiguous selector '{selector}': {reason}")]
    Ambiguous { selector: String, reason: String },
}

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AES key did not resolve to 128, 192 or 256 bits
    #[error("Invalid key size: {0} bits (expected 128, 192 or 256)")]
    InvalidKeySize(usize),

    /// Encryption failure
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    /// Decryption or padding verification failure
    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// One violation found while validating rules against configuration or schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    /// Declaration index of the offending rule
    pub rule_index: usize,

    /// Original selector text
    pub selector: String,

    /// Human readable explanation
    pub message: String,
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rule #{} '{}': {}",
            self.rule_index, self.selector, self.message
        )
    }
}

/// Collected validation violations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<RuleViolation>,
}

impl ValidationReport {
    /// Creates an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation
    pub fn push(
        &mut self,
        rule_index: usize,
        selector: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.violations.push(RuleViolation {
            rule_index,
            selector: selector.into(),
            message: message.into(),
        });
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// True when no violation was recorded
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Converts the report into `Ok(())` when empty, or a validation error
    pub fn into_result(self) -> Result<(), VeilError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(VeilError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for violation in &self.violations {
            writeln!(f, "  - {violation}")?;
        }
        Ok(())
    }
}

impl VeilError {
    /// Shorthand for an invalid-settings configuration error
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        VeilError::Configuration(ConfigurationError::InvalidSettings(message.into()))
    }

    /// Shorthand for a format error
    pub fn format(message: impl Into<String>) -> Self {
        VeilError::Format(message.into())
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for VeilError {
    fn from(err: std::io::Error) -> Self {
        VeilError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for VeilError {
    fn from(err: serde_json::Error) -> Self {
        VeilError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for VeilError {
    fn from(err: toml::de::Error) -> Self {
        VeilError::Configuration(ConfigurationError::Invalid(format!(
            "TOML parse error: {err}"
        )))
    }
}
