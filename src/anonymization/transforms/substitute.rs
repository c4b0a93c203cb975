//! Structural substitution
//!
//! A replacement value is merged into the target subtree field by field.
//! Same-named children pair up by position and unpaired replacement children
//! are appended. An unpaired target child is dropped unless an earlier rule
//! processed it or something below it; in the latter case it stays as an
//! empty placeholder holding only the processed descendants.

use serde_json::Value;
use std::collections::HashSet;

use super::Outcome;
use crate::adapters::fhir;
use crate::adapters::fhir::convert::scalar_from_json;
use crate::anonymization::context::OperationKind;
use crate::domain::{NodeId, RecordFormat, RecordTree, Result, VeilError};

/// Resolved substitute settings
#[derive(Debug, Clone, PartialEq)]
pub struct SubstituteSettings {
    pub replace_with: Value,
}

/// Substitutes the subtree at `node`
///
/// Already-visited descendants are never overwritten. The returned outcome
/// claims the whole subtree so later rules treat it as processed.
pub fn substitute(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &SubstituteSettings,
    visited: &HashSet<NodeId>,
) -> Result<Outcome> {
    match &settings.replace_with {
        Value::Object(_) | Value::Array(_) if tree.format() == RecordFormat::Dicom => {
            Err(VeilError::format(
                "DICOM attributes can only be substituted with primitive values",
            ))
        }
        Value::Object(_) => {
            let target = tree.node(node);
            let replacement =
                fhir::fragment_from_json(&target.name, &target.type_name, &settings.replace_with)?;
            merge(tree, node, &replacement, replacement.root(), visited);
            Ok(Outcome::changed(OperationKind::Substituted).claim_subtree())
        }
        Value::Array(_) => Err(VeilError::format(
            "replacement value must be an object or a primitive, not an array",
        )),
        primitive => {
            tree.set_value(node, scalar_from_json(primitive));
            for child in tree.children(node).to_vec() {
                drop_unvisited(tree, child, visited);
            }
            Ok(Outcome::changed(OperationKind::Substituted).claim_subtree())
        }
    }
}

fn merge(
    tree: &mut RecordTree,
    target: NodeId,
    source: &RecordTree,
    source_id: NodeId,
    visited: &HashSet<NodeId>,
) {
    tree.set_value(target, source.value(source_id).cloned());

    let mut names: Vec<&str> = Vec::new();
    for child in source.children(source_id) {
        let name = source.node(*child).name.as_str();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    for child in tree.children(target).to_vec() {
        if !names.contains(&tree.node(child).name.as_str()) {
            drop_unvisited(tree, child, visited);
        }
    }

    for name in names {
        let replacements: Vec<NodeId> = source
            .children(source_id)
            .iter()
            .copied()
            .filter(|c| source.node(*c).name == name)
            .collect();
        let existing: Vec<NodeId> = tree
            .children(target)
            .iter()
            .copied()
            .filter(|c| !tree.is_record_root(*c) && tree.node(*c).name == name)
            .collect();

        for (index, replacement) in replacements.iter().enumerate() {
            match existing.get(index) {
                Some(current) if visited.contains(current) => {}
                Some(current) => merge(tree, *current, source, *replacement, visited),
                None => {
                    tree.graft(target, source, *replacement);
                }
            }
        }
        for extra in existing.iter().skip(replacements.len()) {
            drop_unvisited(tree, *extra, visited);
        }
    }
}

/// Removes the unvisited parts of an unpaired subtree
fn drop_unvisited(tree: &mut RecordTree, node: NodeId, visited: &HashSet<NodeId>) {
    if visited.contains(&node) || tree.is_record_root(node) {
        return;
    }
    let holds_visited = tree
        .descendants_within_record(node)
        .iter()
        .any(|id| visited.contains(id));
    if !holds_visited {
        tree.detach(node);
        return;
    }

    tree.set_value(node, None);
    for child in tree.children(node).to_vec() {
        drop_unvisited(tree, child, visited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fhir;
    use serde_json::json;

    fn patient() -> RecordTree {
        fhir::from_json(&json!({
            "resourceType": "Patient",
            "address": {
                "use": "home",
                "city": "Seattle",
                "line": ["1 Main St", "Apt 2"],
                "postalCode": "98052"
            }
        }))
        .unwrap()
    }

    fn address(tree: &RecordTree) -> NodeId {
        tree.child_named(tree.root(), "address").unwrap()
    }

    #[test]
    fn test_object_replacement_merges_fields() {
        let mut tree = patient();
        let target = address(&tree);
        let settings = SubstituteSettings {
            replace_with: json!({"city": "Springfield", "line": ["Unknown"], "country": "US"}),
        };

        let outcome = substitute(&mut tree, target, &settings, &HashSet::new()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::Substituted));
        assert!(outcome.claims_subtree());

        let out = fhir::to_json(&tree).unwrap();
        assert_eq!(
            out["address"],
            json!({"city": "Springfield", "line": ["Unknown"], "country": "US"})
        );
    }

    #[test]
    fn test_visited_descendants_are_preserved() {
        let mut tree = patient();
        let target = address(&tree);
        let postal = tree.child_named(target, "postalCode").unwrap();
        tree.set_value(postal, Some("98000".into()));
        let city = tree.child_named(target, "city").unwrap();

        let visited: HashSet<NodeId> = [postal, city].into_iter().collect();
        let settings = SubstituteSettings {
            replace_with: json!({"city": "Springfield"}),
        };
        substitute(&mut tree, target, &settings, &visited).unwrap();

        let out = fhir::to_json(&tree).unwrap();
        assert_eq!(out["address"]["postalCode"], json!("98000"));
        assert_eq!(out["address"]["city"], json!("Seattle"));
        assert!(out["address"].get("use").is_none());
    }

    #[test]
    fn test_unpaired_child_keeps_visited_grandchildren() {
        let mut tree = fhir::from_json(&json!({
            "resourceType": "Patient",
            "address": {
                "city": "Seattle",
                "line": ["1 Main St"],
                "period": {"start": "2019-12-01", "end": "2020-01-01"}
            }
        }))
        .unwrap();
        let target = address(&tree);
        let period = tree.child_named(target, "period").unwrap();
        let start = tree.child_named(period, "start").unwrap();
        tree.set_value(start, Some("2019-11-20".into()));

        let visited: HashSet<NodeId> = [start].into_iter().collect();
        let settings = SubstituteSettings {
            replace_with: json!({"city": "X"}),
        };
        substitute(&mut tree, target, &settings, &visited).unwrap();

        let out = fhir::to_json(&tree).unwrap();
        assert_eq!(out["address"]["city"], json!("X"));
        assert_eq!(out["address"]["period"], json!({"start": "2019-11-20"}));
        assert!(out["address"].get("line").is_none());
    }

    #[test]
    fn test_primitive_replacement() {
        let mut tree = patient();
        let target = address(&tree);
        let city = tree.child_named(target, "city").unwrap();
        let settings = SubstituteSettings {
            replace_with: json!("REDACTED CITY"),
        };
        substitute(&mut tree, city, &settings, &HashSet::new()).unwrap();
        assert_eq!(tree.value(city), Some(&"REDACTED CITY".into()));
    }

    #[test]
    fn test_dicom_object_replacement_is_rejected() {
        let mut tree = RecordTree::new(
            RecordFormat::Dicom,
            crate::domain::Node::new("Dataset", "Dataset"),
        );
        let root = tree.root();
        let settings = SubstituteSettings {
            replace_with: json!({"a": 1}),
        };
        assert!(matches!(
            substitute(&mut tree, root, &settings, &HashSet::new()),
            Err(VeilError::Format(_))
        ));
    }
}
