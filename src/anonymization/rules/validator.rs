//! Batch rule validation
//!
//! Unlike [`compile`](super::compile), which stops at the first bad rule,
//! validation visits every rule and reports all problems at once. With
//! schema checking enabled, exact-path and type rules are also checked
//! against the FHIR field-type graph: unknown fields and types, and methods
//! that cannot act on the field's type.

use super::compiler::{compile_rule, CompiledRule, CompiledRules, Method};
use super::selector::Selector;
use crate::adapters::fhir::FhirSchema;
use crate::anonymization::config::{AnonymizationConfig, ParameterConfig, RuleDescriptor, SharedSettings};
use crate::domain::semantic::{is_dicom_vr, QUANTITY_TYPES};
use crate::domain::{classify, Result, ValidationReport, ValueKind};

/// Compiles every rule, collecting all violations
///
/// Returns the compiled rules when the report is empty.
pub fn validate_rules(
    descriptors: &[RuleDescriptor],
    shared: &SharedSettings,
    parameters: &ParameterConfig,
    check_schema: bool,
) -> (Option<CompiledRules>, ValidationReport) {
    let mut report = ValidationReport::new();
    let mut compiled = Vec::with_capacity(descriptors.len());

    for (index, descriptor) in descriptors.iter().enumerate() {
        let selector_text = descriptor.selector.clone().unwrap_or_default();
        match compile_rule(index, descriptor, shared, parameters) {
            Ok(rule) => {
                if check_schema {
                    for message in schema_violations(&rule) {
                        report.push(index, selector_text.clone(), message);
                    }
                }
                compiled.push(rule);
            }
            Err(e) => report.push(index, selector_text, e.to_string()),
        }
    }

    if report.is_empty() {
        (Some(CompiledRules::new(compiled)), report)
    } else {
        (None, report)
    }
}

/// Validates and compiles the rules of an anonymization configuration
///
/// # Errors
///
/// [`VeilError::Validation`](crate::domain::VeilError::Validation) carrying
/// every violation found.
pub fn validate_config(config: &AnonymizationConfig) -> Result<CompiledRules> {
    let (rules, report) = validate_rules(
        &config.rules,
        &config.settings,
        &config.parameters,
        config.validate_schema,
    );
    match rules {
        Some(rules) => Ok(rules),
        None => report.into_result().map(|_| CompiledRules::new(Vec::new())),
    }
}

/// Schema problems of one compiled rule
pub fn schema_violations(rule: &CompiledRule) -> Vec<String> {
    let schema = FhirSchema::r4();
    match &rule.selector {
        Selector::ExactPath {
            record_type,
            fields,
        } => {
            let mut segments = vec![record_type.as_str()];
            segments.extend(fields.iter().map(String::as_str));
            match schema.resolve_path(&segments) {
                Ok(types) => method_violation(&rule.method, &types).into_iter().collect(),
                Err(message) => vec![message],
            }
        }
        Selector::TypeTag {
            record_type,
            type_name,
        } => {
            let mut violations = Vec::new();
            if let Some(record_type) = record_type {
                if !schema.is_resource(record_type) {
                    violations.push(format!("unknown resource type '{record_type}'"));
                }
            }
            if !schema.has_type(type_name) && !is_dicom_vr(type_name) {
                violations.push(format!("unknown type '{type_name}'"));
            } else {
                violations.extend(method_violation(&rule.method, std::slice::from_ref(type_name)));
            }
            violations
        }
        _ => Vec::new(),
    }
}

fn method_violation(method: &Method, types: &[String]) -> Option<String> {
    let (accepted, expected) = match method {
        Method::DateShift(_) => (
            types.iter().any(|t| classify(t).is_date()),
            "date, dateTime or instant",
        ),
        Method::Perturb(_) => (
            types.iter().any(|t| {
                let kind = classify(t);
                kind.is_numeric()
                    || kind == ValueKind::Quantity
                    || QUANTITY_TYPES.contains(&t.as_str())
            }),
            "a numeric primitive or a Quantity type",
        ),
        _ => return None,
    };
    (!accepted).then(|| {
        format!(
            "method '{}' cannot be applied to {} (expected {expected})",
            method.name(),
            types.join("|")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VeilError;
    use serde_json::json;

    fn check(descriptors: &[RuleDescriptor]) -> ValidationReport {
        validate_rules(descriptors, &SharedSettings::new(), &ParameterConfig::default(), true).1
    }

    #[test]
    fn test_valid_rules_pass() {
        let report = check(&[
            RuleDescriptor::new("Patient.birthDate", "dateshift"),
            RuleDescriptor::new("Observation.valueQuantity", "perturb").with_setting("span", json!(1)),
            RuleDescriptor::new("nodesByType('HumanName')", "redact"),
            RuleDescriptor::new("Patient.deceased", "dateshift"),
            RuleDescriptor::new("DA", "dateshift"),
        ]);
        assert!(report.is_empty(), "{report}");
    }

    #[test]
    fn test_all_violations_are_collected() {
        let report = check(&[
            RuleDescriptor::new("Patient.nickname", "redact"),
            RuleDescriptor::new("Patient.name", "dateshift"),
            RuleDescriptor::new("nodesByType('Frobnicator')", "redact"),
            RuleDescriptor::new("Patient.gender", "perturb").with_setting("span", json!(1)),
            RuleDescriptor::new("Patient.name", "blur"),
            RuleDescriptor::new("Patient.birthDate", "dateshift"),
        ]);
        assert_eq!(report.len(), 5);
        let indexes: Vec<usize> = report.violations.iter().map(|v| v.rule_index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        assert!(report.violations[0].message.contains("nickname"));
        assert!(report.violations[1].message.contains("dateshift"));
    }

    #[test]
    fn test_schema_checks_are_optional() {
        let (rules, report) = validate_rules(
            &[RuleDescriptor::new("Patient.nickname", "redact")],
            &SharedSettings::new(),
            &ParameterConfig::default(),
            false,
        );
        assert!(report.is_empty());
        assert_eq!(rules.unwrap().len(), 1);
    }

    #[test]
    fn test_validate_config_reports_batch() {
        let config = AnonymizationConfig {
            rules: vec![
                RuleDescriptor::new("Patient.nickname", "redact"),
                RuleDescriptor::new("Patient.name", "dateshift"),
            ],
            validate_schema: true,
            ..Default::default()
        };
        match validate_config(&config) {
            Err(VeilError::Validation(report)) => assert_eq!(report.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
