//! De-identification security labels
//!
//! FHIR record roots get one `meta.security` coding per applied label code.
//! DICOM datasets get `PatientIdentityRemoved = YES` and the codes in
//! `DeidentificationMethod`. Writing twice never duplicates a code.

use crate::adapters::dicom::dictionary::{self, DEIDENTIFICATION_METHOD, PATIENT_IDENTITY_REMOVED};
use crate::adapters::fhir::SECURITY_LABEL_SYSTEM;
use crate::anonymization::context::ProcessResult;
use crate::domain::{Node, NodeId, RecordFormat, RecordTree, Scalar, Tag};

/// Writes the labels of `result` onto the record rooted at `record`
///
/// DICOM labels only go on the top-level dataset; sequence items are skipped.
pub fn apply_security_labels(tree: &mut RecordTree, record: NodeId, result: &ProcessResult) {
    let labels = result.security_labels();
    if labels.is_empty() {
        return;
    }
    match tree.format() {
        RecordFormat::Fhir => write_fhir_labels(tree, record, &labels),
        RecordFormat::Dicom if record == tree.root() => write_dicom_labels(tree, record, &labels),
        RecordFormat::Dicom => {}
    }
}

fn write_fhir_labels(tree: &mut RecordTree, record: NodeId, labels: &[&str]) {
    let meta = match tree.child_named(record, "meta") {
        Some(meta) if !tree.is_record_root(meta) => meta,
        _ => {
            // meta goes right after id, as FHIR JSON orders it
            let index = tree
                .children(record)
                .iter()
                .position(|c| tree.node(*c).name == "id")
                .map_or(0, |i| i + 1);
            tree.insert_child(record, index, Node::new("meta", "Meta"))
        }
    };

    let present: Vec<String> = tree
        .children_named(meta, "security")
        .into_iter()
        .filter(|coding| coding_text(tree, *coding, "system").as_deref() == Some(SECURITY_LABEL_SYSTEM))
        .filter_map(|coding| coding_text(tree, coding, "code"))
        .collect();

    for label in labels {
        if present.iter().any(|code| code == label) {
            continue;
        }
        let coding = tree.add_child(meta, Node::new("security", "Coding").in_array(true));
        tree.add_child(coding, Node::leaf("system", "uri", SECURITY_LABEL_SYSTEM.into()));
        tree.add_child(coding, Node::leaf("code", "code", (*label).into()));
    }
}

fn coding_text(tree: &RecordTree, coding: NodeId, field: &str) -> Option<String> {
    tree.child_named(coding, field)
        .and_then(|id| tree.value(id))
        .and_then(Scalar::as_str)
        .map(str::to_string)
}

fn write_dicom_labels(tree: &mut RecordTree, dataset: NodeId, labels: &[&str]) {
    set_attribute(tree, dataset, PATIENT_IDENTITY_REMOVED, "CS", "YES".to_string());

    let mut codes: Vec<String> = find_attribute(tree, dataset, DEIDENTIFICATION_METHOD)
        .and_then(|id| tree.value(id))
        .map(Scalar::to_text)
        .map(|text| {
            text.split('\\')
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for label in labels {
        if !codes.iter().any(|code| code == label) {
            codes.push((*label).to_string());
        }
    }
    set_attribute(tree, dataset, DEIDENTIFICATION_METHOD, "LO", codes.join("\\"));
}

fn find_attribute(tree: &RecordTree, dataset: NodeId, tag: Tag) -> Option<NodeId> {
    tree.children(dataset)
        .iter()
        .copied()
        .find(|child| tree.node(*child).tag == Some(tag))
}

/// Overwrites an attribute's value or inserts it in tag order
fn set_attribute(tree: &mut RecordTree, dataset: NodeId, tag: Tag, vr: &str, value: String) {
    if let Some(id) = find_attribute(tree, dataset, tag) {
        tree.set_value(id, Some(Scalar::String(value)));
        return;
    }
    let name = dictionary::by_tag(tag)
        .map(|entry| entry.keyword.to_string())
        .unwrap_or_else(|| tag.to_key());
    let children = tree.children(dataset);
    let index = children
        .iter()
        .position(|c| tree.node(*c).tag.is_some_and(|t| t > tag))
        .unwrap_or(children.len());
    tree.insert_child(dataset, index, Node::leaf(name, vr, Scalar::String(value)).with_tag(tag));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{dicom, fhir};
    use crate::anonymization::context::OperationKind;
    use serde_json::json;

    fn result(kinds: &[OperationKind]) -> ProcessResult {
        let mut result = ProcessResult::new();
        for kind in kinds {
            result.record(*kind);
        }
        result
    }

    #[test]
    fn test_fhir_meta_inserted_after_id() {
        let mut tree = fhir::from_json(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "gender": "female"
        }))
        .unwrap();
        let root = tree.root();
        apply_security_labels(
            &mut tree,
            root,
            &result(&[OperationKind::Redacted, OperationKind::DateShifted]),
        );

        let json = fhir::to_json(&tree).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["resourceType", "id", "meta", "gender"]);
        assert_eq!(
            json["meta"]["security"],
            json!([
                {"system": SECURITY_LABEL_SYSTEM, "code": "REDACTED"},
                {"system": SECURITY_LABEL_SYSTEM, "code": "PERTURBED"}
            ])
        );
    }

    #[test]
    fn test_fhir_labels_not_duplicated() {
        let mut tree = fhir::from_json(&json!({
            "resourceType": "Patient",
            "meta": {"security": [{"system": SECURITY_LABEL_SYSTEM, "code": "REDACTED"}]}
        }))
        .unwrap();
        let root = tree.root();
        let applied = result(&[OperationKind::Redacted, OperationKind::CryptoHashed]);
        apply_security_labels(&mut tree, root, &applied);
        apply_security_labels(&mut tree, root, &applied);

        let json = fhir::to_json(&tree).unwrap();
        let codes: Vec<&str> = json["meta"]["security"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["REDACTED", "CRYTOHASH"]);
    }

    #[test]
    fn test_empty_result_writes_nothing() {
        let original = json!({"resourceType": "Patient", "id": "p1"});
        let mut tree = fhir::from_json(&original).unwrap();
        let root = tree.root();
        apply_security_labels(&mut tree, root, &ProcessResult::new());
        assert_eq!(fhir::to_json(&tree).unwrap(), original);
    }

    #[test]
    fn test_dicom_attributes_in_tag_order() {
        let mut tree = dicom::from_json(&json!({
            "00080018": {"vr": "UI", "Value": ["1.2.3"]},
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^John"}]},
            "00120063": {"vr": "LO", "Value": ["MANUAL"]}
        }))
        .unwrap();
        let root = tree.root();
        apply_security_labels(
            &mut tree,
            root,
            &result(&[OperationKind::Redacted, OperationKind::Encrypted]),
        );
        apply_security_labels(&mut tree, root, &result(&[OperationKind::Redacted]));

        let json = dicom::to_json(&tree).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["00080018", "00100010", "00120062", "00120063"]);
        assert_eq!(json["00120062"], json!({"vr": "CS", "Value": ["YES"]}));
        assert_eq!(
            json["00120063"],
            json!({"vr": "LO", "Value": ["MANUAL", "REDACTED", "MASKED"]})
        );
    }
}
