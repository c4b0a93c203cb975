//! Init command implementation
//!
//! This module implements the `init` command for generating a starter
//! configuration file from one of the compliance presets.

use crate::anonymization::compliance::ComplianceMode;
use crate::anonymization::config::RuleDescriptor;
use crate::domain::{Result, VeilError};
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "veil.toml")]
    pub output: String,

    /// Rule preset (hipaa_safe_harbor or dicom_basic_profile)
    #[arg(short, long, default_value_t = ComplianceMode::HipaaSafeHarbor)]
    pub mode: ComplianceMode,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, mode = %self.mode, "Initializing configuration file");

        println!("📝 Initializing Veil configuration ({})", self.mode);
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let content = match generate_config(self.mode) {
            Ok(content) => content,
            Err(e) => {
                println!("❌ Failed to render configuration");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        match fs::write(&self.output, content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Review the rules in {}", self.output);
                println!("  2. Set VEIL_DATE_SHIFT_KEY (and VEIL_HASH_KEY if you add cryptohash rules)");
                println!("  3. Validate configuration: veil validate-config --schema");
                println!("  4. Run: veil anonymize --input records.ndjson --output records.anon.ndjson");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

/// Renders a commented configuration file around the preset's rules
pub fn generate_config(mode: ComplianceMode) -> Result<String> {
    let header = format!(
        r#"# Veil Configuration File
# Preset: {mode}

[application]
log_level = "info"

[processing]
format = "{format}"
batch_size = 1000
partition_count = 4
keep_order = true
skip_failed_item = true

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"

[anonymization]
validate_schema = {validate_schema}

[anonymization.parameters]
# date_shift_key = "${{VEIL_DATE_SHIFT_KEY}}"
# crypto_hash_key = "${{VEIL_HASH_KEY}}"
# encrypt_key = "${{VEIL_ENCRYPT_KEY}}"
date_shift_range = 50
enable_partial_dates_for_redact = false
enable_partial_ages_for_redact = false
enable_partial_zip_codes_for_redact = true

[anonymization.audit]
enabled = false
log_path = "./audit/anonymization.log"

# Rules are applied in order; the first rule to reach a field claims it.
"#,
        format = mode.format(),
        validate_schema = mode.format() == crate::domain::RecordFormat::Fhir,
    );

    Ok(format!("{header}\n{}", render_rules(&mode.rules())?))
}

/// Renders rules as `[[anonymization.rules]]` tables
///
/// Settings are written as inline values so nested tables stay inside
/// their rule.
fn render_rules(rules: &[RuleDescriptor]) -> Result<String> {
    let mut out = String::new();
    for rule in rules {
        let mut fields: Vec<(String, toml::Value)> = Vec::new();
        if let Some(selector) = &rule.selector {
            fields.push(("selector".into(), toml::Value::String(selector.clone())));
        }
        if let Some(method) = &rule.method {
            fields.push(("method".into(), toml::Value::String(method.clone())));
        }
        if let Some(resource_type) = &rule.resource_type {
            fields.push(("resource_type".into(), toml::Value::String(resource_type.clone())));
        }
        if let Some(priority) = rule.priority {
            fields.push(("priority".into(), toml::Value::Integer(priority.into())));
        }
        if let Some(setting) = &rule.setting {
            fields.push(("setting".into(), toml::Value::String(setting.clone())));
        }
        for (key, value) in rule.settings.iter().filter(|(_, v)| !v.is_null()) {
            let value = toml::Value::try_from(value)
                .map_err(|e| VeilError::Serialization(format!("setting '{key}': {e}")))?;
            fields.push((key.clone(), value));
        }

        out.push_str("[[anonymization.rules]]\n");
        for (key, value) in fields {
            out.push_str(&format!("{key} = {value}\n"));
        }
        out.push('\n');
    }
    Ok(out)
}
