//! Redaction
//!
//! Values are nulled unless a partial policy is enabled for their kind.
//! Partial policies never keep a value from which an age above the
//! safe-harbor threshold can be read.

use chrono::NaiveDate;

use super::Outcome;
use crate::anonymization::compliance::SAFE_HARBOR_AGE_THRESHOLD;
use crate::anonymization::context::OperationKind;
use crate::domain::dates::parse_dicom_age;
use crate::domain::{
    classify, DateStyle, NodeId, PartialDate, RecordTree, Result, Scalar, ValueKind,
};

/// Resolved redaction policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactSettings {
    pub partial_dates: bool,
    pub partial_ages: bool,
    pub partial_zip_codes: bool,
    pub restricted_zip_prefixes: Vec<String>,
}

/// Redacts one node
pub fn redact(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &RedactSettings,
    today: NaiveDate,
) -> Result<Outcome> {
    let kind = classify(&tree.node(node).type_name);

    if kind == ValueKind::Age {
        return Ok(redact_age_quantity(tree, node, settings));
    }

    let Some(value) = tree.value(node).cloned() else {
        return Ok(Outcome::unchanged());
    };

    let replacement = match kind {
        ValueKind::Date(style) if settings.partial_dates => {
            let date = PartialDate::parse(&value.to_text(), style)?;
            if date.age_on(today) > SAFE_HARBOR_AGE_THRESHOLD {
                None
            } else {
                Some(Scalar::String(year_only(&date, style)))
            }
        }
        ValueKind::AgeString if settings.partial_ages => {
            if parse_dicom_age(&value.to_text())? > f64::from(SAFE_HARBOR_AGE_THRESHOLD) {
                None
            } else {
                Some(value.clone())
            }
        }
        ValueKind::PostalCode if settings.partial_zip_codes => Some(Scalar::String(
            redact_postal_code(&value.to_text(), &settings.restricted_zip_prefixes),
        )),
        _ => None,
    };

    Ok(replace(tree, node, value, replacement))
}

fn replace(
    tree: &mut RecordTree,
    node: NodeId,
    original: Scalar,
    replacement: Option<Scalar>,
) -> Outcome {
    match replacement {
        None => {
            tree.set_value(node, None);
            Outcome::changed(OperationKind::Redacted)
        }
        Some(kept) if kept == original => Outcome::unchanged(),
        Some(kept) => {
            tree.set_value(node, Some(kept));
            Outcome::changed(OperationKind::PartiallyRedacted)
        }
    }
}

/// FHIR `Age`: under the partial policy the quantity is kept whole or wiped whole
fn redact_age_quantity(tree: &mut RecordTree, node: NodeId, settings: &RedactSettings) -> Outcome {
    if !settings.partial_ages {
        return Outcome::unchanged();
    }

    let years = tree
        .child_named(node, "value")
        .and_then(|v| tree.value(v))
        .and_then(Scalar::as_f64)
        .map(|amount| {
            let unit = tree
                .child_named(node, "code")
                .or_else(|| tree.child_named(node, "unit"))
                .and_then(|u| tree.value(u))
                .map(Scalar::to_text);
            amount / units_per_year(unit.as_deref())
        });

    if years.is_some_and(|y| y > f64::from(SAFE_HARBOR_AGE_THRESHOLD)) {
        for id in tree.descendants_within_record(node) {
            tree.set_value(id, None);
        }
        Outcome::changed(OperationKind::Redacted).claim_subtree()
    } else {
        Outcome::unchanged().claim_subtree()
    }
}

/// UCUM age units
fn units_per_year(unit: Option<&str>) -> f64 {
    match unit {
        Some("mo") => 12.0,
        Some("wk") => 52.1775,
        Some("d") => 365.25,
        Some("h") => 8766.0,
        Some("min") => 525_960.0,
        _ => 1.0,
    }
}

fn year_only(date: &PartialDate, style: DateStyle) -> String {
    match style {
        DateStyle::DicomDate | DateStyle::DicomDateTime => format!("{}0101", date.year_only()),
        DateStyle::FhirDate | DateStyle::FhirDateTime => date.year_only(),
    }
}

/// Zeroes identifying digits of a US postal code
///
/// Restricted three-digit prefixes are zeroed entirely, ZIP+4 codes lose
/// their extension, anything else keeps its first three characters.
pub fn redact_postal_code(code: &str, restricted_prefixes: &[String]) -> String {
    let zero = |c: char| if c.is_ascii_digit() { '0' } else { c };

    if restricted_prefixes
        .iter()
        .any(|prefix| code.starts_with(prefix.as_str()))
    {
        return code.chars().map(zero).collect();
    }

    let chars: Vec<char> = code.chars().collect();
    let is_zip_plus_four = chars.len() == 10
        && chars[5] == '-'
        && chars
            .iter()
            .enumerate()
            .all(|(i, c)| i == 5 || c.is_ascii_digit());
    if is_zip_plus_four {
        return format!("{}0000", &code[..6]);
    }

    if chars.len() >= 3 {
        chars[..3]
            .iter()
            .copied()
            .chain(chars[3..].iter().map(|c| zero(*c)))
            .collect()
    } else {
        chars.into_iter().map(zero).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Node;
    use crate::domain::RecordFormat;
    use test_case::test_case;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn leaf(type_name: &str, value: Scalar) -> (RecordTree, NodeId) {
        let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new("Patient", "Patient"));
        let root = tree.root();
        let id = tree.add_child(root, Node::leaf("field", type_name, value));
        (tree, id)
    }

    fn partial() -> RedactSettings {
        RedactSettings {
            partial_dates: true,
            partial_ages: true,
            partial_zip_codes: true,
            restricted_zip_prefixes: vec!["203".to_string(), "556".to_string()],
        }
    }

    #[test_case("98028-1830", "98028-0000" ; "zip plus four")]
    #[test_case("98052", "98000" ; "five digit")]
    #[test_case("20301", "00000" ; "restricted prefix")]
    #[test_case("556", "000" ; "restricted bare prefix")]
    #[test_case("12", "00" ; "short")]
    fn test_postal_codes(input: &str, expected: &str) {
        let restricted = vec!["203".to_string(), "556".to_string()];
        assert_eq!(redact_postal_code(input, &restricted), expected);
    }

    #[test]
    fn test_full_redaction_nulls_value() {
        let (mut tree, id) = leaf("string", Scalar::from("John"));
        let outcome = redact(&mut tree, id, &RedactSettings::default(), today()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::Redacted));
        assert_eq!(tree.value(id), None);
    }

    #[test]
    fn test_redact_is_idempotent() {
        let (mut tree, id) = leaf("string", Scalar::from("John"));
        redact(&mut tree, id, &RedactSettings::default(), today()).unwrap();
        let again = redact(&mut tree, id, &RedactSettings::default(), today()).unwrap();
        assert_eq!(again.kind, None);
        assert_eq!(tree.value(id), None);
    }

    #[test]
    fn test_partial_date_keeps_year() {
        let (mut tree, id) = leaf("date", Scalar::from("1980-03-04"));
        let outcome = redact(&mut tree, id, &partial(), today()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::PartiallyRedacted));
        assert_eq!(tree.value(id), Some(&Scalar::from("1980")));
    }

    #[test]
    fn test_partial_date_over_threshold_is_redacted() {
        let (mut tree, id) = leaf("date", Scalar::from("1920-03-04"));
        let outcome = redact(&mut tree, id, &partial(), today()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::Redacted));
        assert_eq!(tree.value(id), None);
    }

    #[test]
    fn test_partial_dicom_date_keeps_year() {
        let (mut tree, id) = leaf("DA", Scalar::from("19800304"));
        redact(&mut tree, id, &partial(), today()).unwrap();
        assert_eq!(tree.value(id), Some(&Scalar::from("19800101")));
    }

    #[test_case("092Y", None ; "over threshold")]
    #[test_case("057Y", Some("057Y") ; "kept")]
    #[test_case("006M", Some("006M") ; "months")]
    fn test_partial_dicom_age(input: &str, expected: Option<&str>) {
        let (mut tree, id) = leaf("AS", Scalar::from(input));
        redact(&mut tree, id, &partial(), today()).unwrap();
        assert_eq!(tree.value(id), expected.map(Scalar::from).as_ref());
    }

    fn age_tree(years: f64) -> (RecordTree, NodeId, NodeId) {
        let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new("Condition", "Condition"));
        let root = tree.root();
        let age = tree.add_child(root, Node::new("onsetAge", "Age").with_alias("onset"));
        let value = tree.add_child(age, Node::leaf("value", "decimal", Scalar::Decimal(years)));
        tree.add_child(age, Node::leaf("code", "code", Scalar::from("a")));
        (tree, age, value)
    }

    #[test]
    fn test_partial_age_over_threshold() {
        let (mut tree, age, value) = age_tree(92.0);
        let outcome = redact(&mut tree, age, &partial(), today()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::Redacted));
        assert!(outcome.claims_subtree());
        assert_eq!(tree.value(value), None);
    }

    #[test]
    fn test_partial_age_under_threshold_unchanged() {
        let (mut tree, age, value) = age_tree(57.0);
        let outcome = redact(&mut tree, age, &partial(), today()).unwrap();
        assert_eq!(outcome.kind, None);
        assert_eq!(tree.value(value), Some(&Scalar::Decimal(57.0)));
    }

    #[test]
    fn test_partial_zip_code() {
        let (mut tree, id) = leaf("postalCode", Scalar::from("98052"));
        let outcome = redact(&mut tree, id, &partial(), today()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::PartiallyRedacted));
        assert_eq!(tree.value(id), Some(&Scalar::from("98000")));
    }
}
