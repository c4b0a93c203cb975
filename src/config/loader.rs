//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::VeilConfig;
use crate::domain::result::Result;
use crate::domain::{ConfigurationError, VeilError};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Loads configuration from a TOML (or `.json`) file
///
/// This function:
/// 1. Reads the file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses it into [`VeilConfig`]
/// 4. Applies environment variable overrides (VEIL_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns a configuration error if:
/// - File cannot be read
/// - Parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use veil::config::loader::load_config;
///
/// let config = load_config("veil.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<VeilConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(invalid(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        invalid(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let mut config = if is_json {
        let contents = substitute_env_vars(&contents, false)?;
        serde_json::from_str::<VeilConfig>(&contents)
            .map_err(|e| invalid(format!("Failed to parse JSON: {e}")))?
    } else {
        let contents = substitute_env_vars(&contents, true)?;
        toml::from_str::<VeilConfig>(&contents)?
    };

    apply_env_overrides(&mut config)?;
    config.anonymization.apply_env_overrides()?;

    config
        .validate()
        .map_err(|e| invalid(format!("Configuration validation failed: {e}")))?;

    tracing::debug!(
        path = %path.display(),
        rules = config.anonymization.rules.len(),
        "Configuration loaded"
    );
    Ok(config)
}

fn invalid(message: String) -> VeilError {
    VeilError::Configuration(ConfigurationError::Invalid(message))
}

fn env_placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static placeholder pattern")
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// `#` comment lines are left untouched when `skip_comments` is set. All
/// missing variables are reported together.
fn substitute_env_vars(input: &str, skip_comments: bool) -> Result<String> {
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if skip_comments && line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in env_placeholder().captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&cap[0], &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(invalid(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(format!("Invalid {name} value: {value}")))
}

/// Applies environment variable overrides using VEIL_* prefix
///
/// Environment variables follow the pattern VEIL_<SECTION>_<KEY>, for
/// example VEIL_PROCESSING_BATCH_SIZE. Anonymization keys are handled by
/// [`AnonymizationConfig::apply_env_overrides`](crate::anonymization::AnonymizationConfig::apply_env_overrides).
fn apply_env_overrides(config: &mut VeilConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("VEIL_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Processing overrides
    if let Ok(val) = std::env::var("VEIL_PROCESSING_BATCH_SIZE") {
        config.processing.batch_size = parse_env("VEIL_PROCESSING_BATCH_SIZE", &val)?;
    }
    if let Ok(val) = std::env::var("VEIL_PROCESSING_PARTITION_COUNT") {
        config.processing.partition_count = parse_env("VEIL_PROCESSING_PARTITION_COUNT", &val)?;
    }
    if let Ok(val) = std::env::var("VEIL_PROCESSING_KEEP_ORDER") {
        config.processing.keep_order = parse_env("VEIL_PROCESSING_KEEP_ORDER", &val)?;
    }
    if let Ok(val) = std::env::var("VEIL_PROCESSING_SKIP_FAILED_ITEM") {
        config.processing.skip_failed_item = parse_env("VEIL_PROCESSING_SKIP_FAILED_ITEM", &val)?;
    }
    if let Ok(val) = std::env::var("VEIL_PROCESSING_FORMAT") {
        config.processing.format = val.parse()?;
    }

    // Logging overrides
    if let Ok(val) = std::env::var("VEIL_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_env("VEIL_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("VEIL_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("VEIL_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecordFormat;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // the process environment is shared by all tests in this binary
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_substitute_env_vars() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("VEIL_TEST_HASH_KEY", "s3cr3t");
        let result = substitute_env_vars("crypto_hash_key = \"${VEIL_TEST_HASH_KEY}\"", true).unwrap();
        assert_eq!(result, "crypto_hash_key = \"s3cr3t\"");
        std::env::remove_var("VEIL_TEST_HASH_KEY");
    }

    #[test]
    fn test_substitute_skips_comments_and_reports_all_missing() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var("VEIL_TEST_MISSING_A");
        std::env::remove_var("VEIL_TEST_MISSING_B");

        let commented = "# key = \"${VEIL_TEST_MISSING_A}\"";
        assert_eq!(substitute_env_vars(commented, true).unwrap(), commented);

        let input = "a = \"${VEIL_TEST_MISSING_A}\"\nb = \"${VEIL_TEST_MISSING_B}\"";
        let err = substitute_env_vars(input, true).unwrap_err().to_string();
        assert!(err.contains("VEIL_TEST_MISSING_A"));
        assert!(err.contains("VEIL_TEST_MISSING_B"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent-veil.toml");
        assert!(matches!(result, Err(VeilError::Configuration(_))));
    }

    #[test]
    fn test_load_config_valid() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(
            r#"
[application]
log_level = "debug"

[processing]
batch_size = 250
partition_count = 8
format = "fhir"

[anonymization]
validate_schema = true

[anonymization.parameters]
date_shift_key = "salt"
enable_partial_dates_for_redact = true

[[anonymization.rules]]
selector = "Patient.birthDate"
method = "dateshift"

[[anonymization.rules]]
selector = "nodesByType('HumanName')"
method = "redact"
"#,
            ".toml",
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.processing.batch_size, 250);
        assert_eq!(config.processing.partition_count, 8);
        assert_eq!(config.anonymization.rules.len(), 2);
        assert!(config.anonymization.parameters.enable_partial_dates_for_redact);
        assert_eq!(
            config
                .anonymization
                .parameters
                .date_shift_key
                .as_ref()
                .unwrap()
                .expose_secret()
                .as_ref(),
            "salt"
        );
    }

    #[test]
    fn test_load_json_config() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config(
            r#"{
                "processing": {"format": "dicom"},
                "anonymization": {"rules": [{"selector": "(0010,0010)", "method": "redact"}]}
            }"#,
            ".json",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.processing.format, RecordFormat::Dicom);
        assert_eq!(config.anonymization.rules[0].selector.as_deref(), Some("(0010,0010)"));
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config("[processing]\nbatch_size = 10\n", ".toml");

        std::env::set_var("VEIL_PROCESSING_BATCH_SIZE", "42");
        std::env::set_var("VEIL_PROCESSING_KEEP_ORDER", "false");
        std::env::set_var("VEIL_ANONYMIZATION_CRYPTO_HASH_KEY", "from-env");
        let result = load_config(file.path());
        std::env::remove_var("VEIL_PROCESSING_BATCH_SIZE");
        std::env::remove_var("VEIL_PROCESSING_KEEP_ORDER");
        std::env::remove_var("VEIL_ANONYMIZATION_CRYPTO_HASH_KEY");

        let config = result.unwrap();
        assert_eq!(config.processing.batch_size, 42);
        assert!(!config.processing.keep_order);
        assert!(config.anonymization.parameters.crypto_hash_key.is_some());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config("", ".toml");

        std::env::set_var("VEIL_PROCESSING_PARTITION_COUNT", "many");
        let result = load_config(file.path());
        std::env::remove_var("VEIL_PROCESSING_PARTITION_COUNT");

        let err = result.unwrap_err().to_string();
        assert!(err.contains("VEIL_PROCESSING_PARTITION_COUNT"));
    }

    #[test]
    fn test_validation_failure() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_config("[processing]\nbatch_size = 0\n", ".toml");
        let err = load_config(file.path()).unwrap_err().to_string();
        assert!(err.contains("batch_size"));
    }
}
