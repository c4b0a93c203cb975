//! Rule compilation
//!
//! Turns configuration [`RuleDescriptor`]s into immutable [`CompiledRule`]s.
//! Every setting is resolved and checked here so that nothing about a rule
//! can fail for configuration reasons once records start flowing.
//!
//! Settings are looked up in three layers, most specific first: the keys
//! written on the rule itself, the shared table the rule names with
//! `setting = "<name>"`, and the engine-wide `[anonymization.parameters]`.

use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use super::selector::Selector;
use crate::adapters::fhir::convert::scalar_from_json;
use crate::anonymization::config::{
    DateShiftScope, HashAlgorithm, ParameterConfig, RuleDescriptor, SharedSettings,
};
use crate::anonymization::transforms::generalize::{GeneralizeCase, OtherValues, Predicate};
use crate::anonymization::transforms::{
    CryptoHashSettings, DateShiftSettings, EncryptSettings, GeneralizeSettings, PerturbSettings,
    RangeType, RedactSettings, SubstituteSettings,
};
use crate::domain::{ConfigurationError, Result, VeilError};

/// Upper bound for `date_shift_range`, in days
pub const MAX_DATE_SHIFT_RANGE: i64 = 36_500;

/// Transform bound to a rule, with its resolved settings
#[derive(Debug, Clone)]
pub enum Method {
    Redact(RedactSettings),
    DateShift(DateShiftSettings),
    CryptoHash(CryptoHashSettings),
    Encrypt(EncryptSettings),
    Perturb(PerturbSettings),
    Substitute(SubstituteSettings),
    Generalize(GeneralizeSettings),
    Remove,
    Keep,
    Ner,
}

impl Method {
    /// Canonical method name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redact(_) => "redact",
            Self::DateShift(_) => "dateshift",
            Self::CryptoHash(_) => "cryptohash",
            Self::Encrypt(_) => "encrypt",
            Self::Perturb(_) => "perturb",
            Self::Substitute(_) => "substitute",
            Self::Generalize(_) => "generalize",
            Self::Remove => "remove",
            Self::Keep => "keep",
            Self::Ner => "ner",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One compiled rule
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Declaration order
    pub index: usize,
    pub selector: Selector,
    pub method: Method,
    /// Tie-break among type rules, lower wins
    pub priority: i32,
    /// Record type the rule is restricted to
    pub scope: Option<String>,
    /// Selector text as written
    pub source: String,
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} -> {}", self.index, self.source, self.method)
    }
}

/// Ordered, shareable rule table
#[derive(Debug, Clone)]
pub struct CompiledRules {
    rules: Arc<[CompiledRule]>,
}

impl CompiledRules {
    pub fn new(rules: Vec<CompiledRule>) -> Self {
        Self { rules: rules.into() }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompiledRule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// True when any rule hands text to the NER service
    pub fn uses_ner(&self) -> bool {
        self.rules.iter().any(|r| matches!(r.method, Method::Ner))
    }
}

impl<'a> IntoIterator for &'a CompiledRules {
    type Item = &'a CompiledRule;
    type IntoIter = std::slice::Iter<'a, CompiledRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Compiles rules with default engine parameters
pub fn compile(descriptors: &[RuleDescriptor], shared: &SharedSettings) -> Result<CompiledRules> {
    compile_with(descriptors, shared, &ParameterConfig::default())
}

/// Compiles rules, failing on the first invalid one
pub fn compile_with(
    descriptors: &[RuleDescriptor],
    shared: &SharedSettings,
    parameters: &ParameterConfig,
) -> Result<CompiledRules> {
    let rules = descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| compile_rule(index, descriptor, shared, parameters))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(rules = rules.len(), "Compiled anonymization rules");
    Ok(CompiledRules::new(rules))
}

/// Compiles one descriptor
pub fn compile_rule(
    index: usize,
    descriptor: &RuleDescriptor,
    shared: &SharedSettings,
    parameters: &ParameterConfig,
) -> Result<CompiledRule> {
    let source = descriptor
        .selector
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigurationError::MissingField {
            rule_index: index,
            field: "selector".to_string(),
        })?;
    let method_name = descriptor
        .method
        .clone()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ConfigurationError::MissingField {
            rule_index: index,
            field: "method".to_string(),
        })?;

    let selector = Selector::parse(&source)?;
    let settings = merged_settings(index, descriptor, shared)?;
    let method = build_method(&method_name, settings, parameters).map_err(|e| match e {
        VeilError::Configuration(ConfigurationError::InvalidSettings(message)) => {
            VeilError::invalid_settings(format!("rule #{index} '{source}': {message}"))
        }
        other => other,
    })?;

    Ok(CompiledRule {
        index,
        selector,
        method,
        priority: descriptor.priority.unwrap_or(0),
        scope: descriptor
            .resource_type
            .clone()
            .filter(|s| !s.is_empty() && s != "Resource"),
        source,
    })
}

fn merged_settings(
    index: usize,
    descriptor: &RuleDescriptor,
    shared: &SharedSettings,
) -> Result<Map<String, Value>> {
    let mut merged = match &descriptor.setting {
        Some(name) => shared.get(name).cloned().ok_or_else(|| {
            VeilError::invalid_settings(format!(
                "rule #{index} refers to unknown setting table '{name}'"
            ))
        })?,
        None => Map::new(),
    };
    for (key, value) in &descriptor.settings {
        merged.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

/// Lower-cases and strips `_`/`-` so `date_shift`, `DateShift` and `date-shift` agree
fn normalize_method(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_settings<T: DeserializeOwned>(settings: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(settings))
        .map_err(|e| VeilError::invalid_settings(e.to_string()))
}

fn build_method(
    name: &str,
    settings: Map<String, Value>,
    parameters: &ParameterConfig,
) -> Result<Method> {
    let method = match normalize_method(name).as_str() {
        "redact" => Method::Redact(redact_settings(parse_settings(settings)?, parameters)),
        "dateshift" => Method::DateShift(date_shift_settings(parse_settings(settings)?, parameters)?),
        "cryptohash" => {
            Method::CryptoHash(crypto_hash_settings(parse_settings(settings)?, parameters)?)
        }
        "encrypt" => Method::Encrypt(encrypt_settings(parse_settings(settings)?, parameters)?),
        "perturb" => Method::Perturb(perturb_settings(parse_settings(settings)?)?),
        "substitute" => Method::Substitute(substitute_settings(parse_settings(settings)?)?),
        "generalize" => Method::Generalize(generalize_settings(parse_settings(settings)?)?),
        plain @ ("remove" | "keep" | "ner" | "namedentityrecognition") => {
            if !settings.is_empty() {
                let keys: Vec<&String> = settings.keys().collect();
                return Err(VeilError::invalid_settings(format!(
                    "method '{plain}' takes no settings, got {keys:?}"
                )));
            }
            match plain {
                "remove" => Method::Remove,
                "keep" => Method::Keep,
                _ => Method::Ner,
            }
        }
        _ => return Err(ConfigurationError::UnsupportedMethod(name.to_string()).into()),
    };
    Ok(method)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRedact {
    #[serde(alias = "enablePartialAgesForRedact")]
    enable_partial_ages_for_redact: Option<bool>,
    #[serde(alias = "enablePartialDatesForRedact")]
    enable_partial_dates_for_redact: Option<bool>,
    #[serde(alias = "enablePartialZipCodesForRedact")]
    enable_partial_zip_codes_for_redact: Option<bool>,
    #[serde(alias = "restrictedZipCodeTabulationAreas")]
    restricted_zip_code_tabulation_areas: Option<Vec<String>>,
}

fn redact_settings(raw: RawRedact, parameters: &ParameterConfig) -> RedactSettings {
    RedactSettings {
        partial_ages: raw
            .enable_partial_ages_for_redact
            .unwrap_or(parameters.enable_partial_ages_for_redact),
        partial_dates: raw
            .enable_partial_dates_for_redact
            .unwrap_or(parameters.enable_partial_dates_for_redact),
        partial_zip_codes: raw
            .enable_partial_zip_codes_for_redact
            .unwrap_or(parameters.enable_partial_zip_codes_for_redact),
        restricted_zip_prefixes: raw
            .restricted_zip_code_tabulation_areas
            .unwrap_or_else(|| parameters.restricted_zip_code_tabulation_areas.clone()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDateShift {
    #[serde(alias = "dateShiftKey")]
    date_shift_key: Option<String>,
    #[serde(alias = "dateShiftRange")]
    date_shift_range: Option<i64>,
    #[serde(alias = "dateShiftScope")]
    date_shift_scope: Option<DateShiftScope>,
}

fn date_shift_settings(raw: RawDateShift, parameters: &ParameterConfig) -> Result<DateShiftSettings> {
    let range = raw.date_shift_range.unwrap_or(parameters.date_shift_range);
    if !(1..=MAX_DATE_SHIFT_RANGE).contains(&range) {
        return Err(VeilError::invalid_settings(format!(
            "date_shift_range must be between 1 and {MAX_DATE_SHIFT_RANGE}, got {range}"
        )));
    }
    let key = raw.date_shift_key.unwrap_or_else(|| {
        parameters
            .date_shift_key
            .as_ref()
            .map(|k| k.expose_secret().as_ref().to_string())
            .unwrap_or_default()
    });
    Ok(DateShiftSettings {
        key: Zeroizing::new(key),
        range,
        scope: raw.date_shift_scope.unwrap_or(parameters.date_shift_scope),
        partial_dates: parameters.enable_partial_dates_for_redact,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCryptoHash {
    #[serde(alias = "cryptoHashKey")]
    crypto_hash_key: Option<String>,
    #[serde(alias = "crypto_hash_algorithm", alias = "cryptoHashAlgorithm")]
    algorithm: Option<String>,
    #[serde(alias = "matchInputStringLength", alias = "match_input_string_length")]
    match_input_length: Option<bool>,
}

fn crypto_hash_settings(
    raw: RawCryptoHash,
    parameters: &ParameterConfig,
) -> Result<CryptoHashSettings> {
    let key = raw
        .crypto_hash_key
        .or_else(|| {
            parameters
                .crypto_hash_key
                .as_ref()
                .map(|k| k.expose_secret().as_ref().to_string())
        })
        .filter(|k| !k.is_empty())
        .ok_or_else(|| VeilError::invalid_settings("cryptohash requires a non-empty crypto_hash_key"))?;
    let algorithm = match raw.algorithm {
        Some(text) => text.parse::<HashAlgorithm>()?,
        None => parameters.crypto_hash_algorithm,
    };
    Ok(CryptoHashSettings {
        key: Zeroizing::new(key),
        algorithm,
        match_input_length: raw.match_input_length.unwrap_or(false),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEncrypt {
    #[serde(alias = "encryptKey")]
    encrypt_key: Option<String>,
}

fn encrypt_settings(raw: RawEncrypt, parameters: &ParameterConfig) -> Result<EncryptSettings> {
    let key = Zeroizing::new(
        raw.encrypt_key
            .or_else(|| {
                parameters
                    .encrypt_key
                    .as_ref()
                    .map(|k| k.expose_secret().as_ref().to_string())
            })
            .ok_or_else(|| VeilError::invalid_settings("encrypt requires an encrypt_key"))?,
    );
    EncryptSettings::new(&key)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPerturb {
    span: Option<f64>,
    #[serde(alias = "rangeType")]
    range_type: Option<RangeType>,
    #[serde(alias = "roundTo")]
    round_to: Option<u32>,
}

fn perturb_settings(raw: RawPerturb) -> Result<PerturbSettings> {
    let span = raw
        .span
        .ok_or_else(|| VeilError::invalid_settings("perturb requires 'span'"))?;
    if !span.is_finite() || span < 0.0 {
        return Err(VeilError::invalid_settings(format!(
            "perturb span must be a finite number >= 0, got {span}"
        )));
    }
    let round_to = raw.round_to.unwrap_or(2);
    if round_to > 28 {
        return Err(VeilError::invalid_settings(format!(
            "perturb round_to must be between 0 and 28, got {round_to}"
        )));
    }
    Ok(PerturbSettings {
        span,
        range_type: raw.range_type.unwrap_or_default(),
        round_to,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSubstitute {
    #[serde(alias = "replaceWith")]
    replace_with: Option<Value>,
}

fn substitute_settings(raw: RawSubstitute) -> Result<SubstituteSettings> {
    match raw.replace_with {
        Some(Value::Array(_)) => Err(VeilError::invalid_settings(
            "substitute replace_with must be an object or a primitive, not an array",
        )),
        Some(replace_with) => Ok(SubstituteSettings { replace_with }),
        None => Err(VeilError::invalid_settings("substitute requires 'replace_with'")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCase {
    predicate: String,
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGeneralize {
    cases: Option<Vec<RawCase>>,
    #[serde(alias = "otherValues")]
    other_values: Option<OtherValues>,
}

fn generalize_settings(raw: RawGeneralize) -> Result<GeneralizeSettings> {
    let raw_cases = raw
        .cases
        .filter(|c| !c.is_empty())
        .ok_or_else(|| VeilError::invalid_settings("generalize requires at least one case"))?;

    let cases = raw_cases
        .into_iter()
        .map(|case| {
            let predicate = Predicate::parse(&case.predicate)
                .map_err(|e| VeilError::invalid_settings(e.to_string()))?;
            let value = scalar_from_json(&case.value).ok_or_else(|| {
                VeilError::invalid_settings(format!(
                    "generalize case '{}' must map to a primitive value",
                    case.predicate
                ))
            })?;
            Ok(GeneralizeCase {
                predicate,
                source: case.predicate,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(GeneralizeSettings {
        cases,
        other_values: raw.other_values.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use crate::domain::{CryptoError, SelectorError};
    use serde_json::json;
    use test_case::test_case;

    fn one(descriptor: RuleDescriptor) -> Result<CompiledRule> {
        let rules = compile(&[descriptor], &SharedSettings::new())?;
        Ok(rules.as_slice()[0].clone())
    }

    #[test_case("redact" ; "lower")]
    #[test_case("Redact" ; "capitalized")]
    #[test_case("REDACT" ; "upper")]
    fn test_method_name_is_case_insensitive(name: &str) {
        let rule = one(RuleDescriptor::new("Patient.name", name)).unwrap();
        assert!(matches!(rule.method, Method::Redact(_)));
    }

    #[test_case("date_shift" ; "snake")]
    #[test_case("DateShift" ; "pascal")]
    #[test_case("date-shift" ; "kebab")]
    fn test_method_name_separators(name: &str) {
        let rule = one(RuleDescriptor::new("Patient.birthDate", name)).unwrap();
        assert_eq!(rule.method.name(), "dateshift");
    }

    #[test]
    fn test_missing_fields() {
        let no_selector = RuleDescriptor {
            method: Some("redact".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            one(no_selector),
            Err(VeilError::Configuration(ConfigurationError::MissingField { field, .. })) if field == "selector"
        ));

        let no_method = RuleDescriptor {
            selector: Some("Patient.name".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            one(no_method),
            Err(VeilError::Configuration(ConfigurationError::MissingField { field, .. })) if field == "method"
        ));
    }

    #[test]
    fn test_unsupported_method() {
        assert!(matches!(
            one(RuleDescriptor::new("Patient.name", "blur")),
            Err(VeilError::Configuration(ConfigurationError::UnsupportedMethod(m))) if m == "blur"
        ));
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(
            one(RuleDescriptor::new("Patient..name", "redact")),
            Err(VeilError::Selector(SelectorError::InvalidSelector(_)))
        ));
    }

    #[test]
    fn test_shared_settings_merge_under_inline_keys() {
        let mut shared = SharedSettings::new();
        shared.insert(
            "noise".to_string(),
            json!({"span": 2.0, "round_to": 1}).as_object().cloned().unwrap(),
        );
        let descriptor = RuleDescriptor::new("Observation.valueQuantity", "perturb")
            .using("noise")
            .with_setting("round_to", json!(3));

        let rules = compile(&[descriptor], &shared).unwrap();
        match &rules.as_slice()[0].method {
            Method::Perturb(settings) => {
                assert_eq!(settings.span, 2.0);
                assert_eq!(settings.round_to, 3);
            }
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[test]
    fn test_unknown_shared_setting() {
        let descriptor = RuleDescriptor::new("Patient.name", "redact").using("missing");
        assert!(matches!(
            one(descriptor),
            Err(VeilError::Configuration(ConfigurationError::InvalidSettings(_)))
        ));
    }

    #[test]
    fn test_unknown_setting_key_is_rejected() {
        let descriptor = RuleDescriptor::new("Patient.name", "redact").with_setting("spann", json!(1));
        assert!(matches!(
            one(descriptor),
            Err(VeilError::Configuration(ConfigurationError::InvalidSettings(_)))
        ));
    }

    #[test]
    fn test_camel_case_aliases() {
        let descriptor = RuleDescriptor::new("Observation.valueQuantity", "perturb")
            .with_setting("span", json!(0.1))
            .with_setting("rangeType", json!("proportional"))
            .with_setting("roundTo", json!(0));
        match one(descriptor).unwrap().method {
            Method::Perturb(settings) => {
                assert_eq!(settings.range_type, RangeType::Proportional);
                assert_eq!(settings.round_to, 0);
            }
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[test]
    fn test_encrypt_key_size_checked_eagerly() {
        let descriptor =
            RuleDescriptor::new("Patient.id", "encrypt").with_setting("encrypt_key", json!("short"));
        assert!(matches!(
            one(descriptor),
            Err(VeilError::Crypto(CryptoError::InvalidKeySize(40)))
        ));
    }

    #[test]
    fn test_encrypt_key_from_parameters() {
        let parameters = ParameterConfig {
            encrypt_key: Some(secret_string("0123456789abcdef".to_string())),
            ..Default::default()
        };
        let rules = compile_with(
            &[RuleDescriptor::new("Patient.id", "encrypt")],
            &SharedSettings::new(),
            &parameters,
        )
        .unwrap();
        assert!(matches!(rules.as_slice()[0].method, Method::Encrypt(_)));
    }

    #[test]
    fn test_keys_resolved_from_parameters() {
        let parameters = ParameterConfig {
            date_shift_key: Some(secret_string("shift-key".to_string())),
            crypto_hash_key: Some(secret_string("hash-key".to_string())),
            encrypt_key: Some(secret_string("0123456789abcdef".to_string())),
            ..Default::default()
        };
        let rules = compile_with(
            &[
                RuleDescriptor::new("Patient.birthDate", "dateshift"),
                RuleDescriptor::new("Patient.id", "cryptohash"),
                RuleDescriptor::new("Patient.identifier.value", "encrypt"),
            ],
            &SharedSettings::new(),
            &parameters,
        )
        .unwrap();

        match &rules.as_slice()[0].method {
            Method::DateShift(settings) => assert_eq!(settings.key.as_str(), "shift-key"),
            other => panic!("unexpected method {other:?}"),
        }
        match &rules.as_slice()[1].method {
            Method::CryptoHash(settings) => assert_eq!(settings.key.as_str(), "hash-key"),
            other => panic!("unexpected method {other:?}"),
        }
        match &rules.as_slice()[2].method {
            Method::Encrypt(settings) => assert_eq!(settings.key(), b"0123456789abcdef"),
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[test]
    fn test_crypto_hash_requires_key() {
        assert!(matches!(
            one(RuleDescriptor::new("Patient.id", "cryptohash")),
            Err(VeilError::Configuration(ConfigurationError::InvalidSettings(_)))
        ));
        let keyed = RuleDescriptor::new("Patient.id", "cryptohash")
            .with_setting("crypto_hash_key", json!("k"))
            .with_setting("algorithm", json!("sha512"));
        match one(keyed).unwrap().method {
            Method::CryptoHash(settings) => assert_eq!(settings.algorithm, HashAlgorithm::Sha512),
            other => panic!("unexpected method {other:?}"),
        }
    }

    #[test_case(json!({"span": -1.0}) ; "negative span")]
    #[test_case(json!({}) ; "missing span")]
    #[test_case(json!({"span": 1.0, "round_to": 29}) ; "round to too large")]
    fn test_invalid_perturb(settings: Value) {
        let mut descriptor = RuleDescriptor::new("Observation.valueQuantity", "perturb");
        descriptor.settings = settings.as_object().cloned().unwrap();
        assert!(one(descriptor).is_err());
    }

    #[test_case(0 ; "zero")]
    #[test_case(36_501 ; "too large")]
    fn test_invalid_date_shift_range(range: i64) {
        let descriptor = RuleDescriptor::new("Patient.birthDate", "dateshift")
            .with_setting("date_shift_range", json!(range));
        assert!(one(descriptor).is_err());
    }

    #[test]
    fn test_substitute_requires_replacement() {
        assert!(one(RuleDescriptor::new("Patient.address", "substitute")).is_err());
        let ok = RuleDescriptor::new("Patient.address", "substitute")
            .with_setting("replaceWith", json!({"city": "Springfield"}));
        assert!(matches!(one(ok).unwrap().method, Method::Substitute(_)));
    }

    #[test]
    fn test_generalize_cases() {
        let descriptor = RuleDescriptor::new("Patient.extension.valueInteger", "generalize")
            .with_setting(
                "cases",
                json!([
                    {"predicate": "$this < 18", "value": "minor"},
                    {"predicate": "$this >= 18", "value": "adult"}
                ]),
            )
            .with_setting("otherValues", json!("keep"));
        match one(descriptor).unwrap().method {
            Method::Generalize(settings) => {
                assert_eq!(settings.cases.len(), 2);
                assert_eq!(settings.other_values, OtherValues::Keep);
            }
            other => panic!("unexpected method {other:?}"),
        }

        let broken = RuleDescriptor::new("Patient.gender", "generalize")
            .with_setting("cases", json!([{"predicate": "$this ==", "value": "x"}]));
        assert!(one(broken).is_err());
    }

    #[test]
    fn test_plain_methods_reject_settings() {
        let descriptor = RuleDescriptor::new("Patient.photo", "remove").with_setting("span", json!(1));
        assert!(one(descriptor).is_err());
        assert!(matches!(
            one(RuleDescriptor::new("Patient.text.div", "namedEntityRecognition"))
                .unwrap()
                .method,
            Method::Ner
        ));
    }

    #[test]
    fn test_priority_scope_and_order() {
        let rules = compile(
            &[
                RuleDescriptor::new("nodesByType('date')", "dateshift").with_priority(2),
                RuleDescriptor::new("nodesByType('string')", "redact").scoped_to("Patient"),
                RuleDescriptor::new("nodesByType('code')", "keep").scoped_to("Resource"),
            ],
            &SharedSettings::new(),
        )
        .unwrap();
        let rules = rules.as_slice();
        assert_eq!(rules[0].priority, 2);
        assert_eq!(rules[1].priority, 0);
        assert_eq!(rules[1].scope.as_deref(), Some("Patient"));
        assert_eq!(rules[2].scope, None);
        assert!(rules.iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[test]
    fn test_rules_share_storage() {
        let rules = compile(
            &[RuleDescriptor::new("Patient.name", "redact")],
            &SharedSettings::new(),
        )
        .unwrap();
        let clone = rules.clone();
        assert!(std::ptr::eq(rules.as_slice(), clone.as_slice()));
        assert!(!rules.uses_ner());
    }
}
