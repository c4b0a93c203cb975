//! Validate config command implementation
//!
//! This module implements the `validate-config` command. Besides loading the
//! configuration file it compiles every rule and reports all problems in one
//! pass, optionally checking selectors and methods against the FHIR schema.

use crate::anonymization::rules::validate_rules;
use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also check path and type rules against the FHIR schema
    #[arg(long)]
    pub schema: bool,
}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let anonymization = &config.anonymization;
        let check_schema = self.schema || anonymization.validate_schema;
        let (rules, report) = validate_rules(
            &anonymization.rules,
            &anonymization.settings,
            &anonymization.parameters,
            check_schema,
        );

        let Some(rules) = rules else {
            println!("❌ Rule validation failed with {} violation(s)", report.len());
            for violation in &report.violations {
                println!("   - {violation}");
            }
            println!();
            return Ok(2);
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Format: {}", config.processing.format);
        println!("  Batch Size: {}", config.processing.batch_size);
        println!("  Partitions: {}", config.processing.partition_count);
        println!("  Keep Order: {}", config.processing.keep_order);
        println!("  Rules: {}", rules.len());
        println!("  Schema Checked: {check_schema}");
        println!(
            "  Audit Log: {}",
            if anonymization.audit.enabled {
                anonymization.audit.log_path.display().to_string()
            } else {
                "disabled".to_string()
            }
        );
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_valid_config_exits_zero() {
        let file = config_file(
            "[[anonymization.rules]]\nselector = \"Patient.name\"\nmethod = \"redact\"\n",
        );
        let args = ValidateArgs { schema: true };
        let code = args.execute(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_bad_rules_exit_with_config_error() {
        let file = config_file(
            "[[anonymization.rules]]\nselector = \"Patient.name\"\nmethod = \"blur\"\n\n\
             [[anonymization.rules]]\nselector = \"Patient.nickname\"\nmethod = \"redact\"\n",
        );
        let args = ValidateArgs { schema: true };
        let code = args.execute(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_missing_file_exits_with_config_error() {
        let args = ValidateArgs { schema: false };
        let code = args.execute("does-not-exist.toml").await.unwrap();
        assert_eq!(code, 2);
    }
}
