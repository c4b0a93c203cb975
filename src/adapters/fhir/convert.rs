//! FHIR JSON to record tree conversion
//!
//! Every JSON array member becomes a sibling node sharing the field name, so
//! `Patient.name.given` addresses every given name of every name. Objects
//! carrying `resourceType` (bundle entries, contained resources) become nested
//! record roots.

use serde_json::{Map, Number, Value};

use super::schema::FhirSchema;
use crate::domain::{Node, NodeId, RecordFormat, RecordTree, Result, Scalar, VeilError};

/// Builds a record tree from a FHIR resource
///
/// # Errors
///
/// Returns [`VeilError::Format`] when the value is not a resource object or
/// contains nested arrays.
pub fn from_json(value: &Value) -> Result<RecordTree> {
    let object = value
        .as_object()
        .ok_or_else(|| VeilError::format("FHIR resource must be a JSON object"))?;
    let resource_type = resource_type(object)
        .ok_or_else(|| VeilError::format("FHIR resource is missing 'resourceType'"))?;

    let mut tree = RecordTree::new(
        RecordFormat::Fhir,
        Node::new(resource_type, resource_type).record(resource_type),
    );
    let root = tree.root();
    add_fields(&mut tree, root, resource_type, object)?;
    Ok(tree)
}

/// Builds a standalone fragment of the given element type from any JSON value
///
/// Used for substitution payloads; the fragment root carries the value for
/// primitive payloads and the fields for object payloads.
pub fn fragment_from_json(name: &str, type_name: &str, value: &Value) -> Result<RecordTree> {
    let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new(name, type_name));
    let root = tree.root();
    match value {
        Value::Object(object) => add_fields(&mut tree, root, type_name, object)?,
        Value::Array(_) => {
            return Err(VeilError::format(
                "replacement value must be an object or a primitive, not an array",
            ))
        }
        other => tree.set_value(root, scalar_from_json(other)),
    }
    Ok(tree)
}

fn resource_type(object: &Map<String, Value>) -> Option<&str> {
    object.get("resourceType").and_then(Value::as_str)
}

fn add_fields(
    tree: &mut RecordTree,
    parent: NodeId,
    parent_type: &str,
    object: &Map<String, Value>,
) -> Result<()> {
    let schema = FhirSchema::r4();
    let is_record = tree.is_record_root(parent) && object.contains_key("resourceType");

    for (key, value) in object {
        if is_record && key == "resourceType" {
            continue;
        }
        let element = schema.element(parent_type, key);
        let declared = element.as_ref().and_then(|e| e.type_name.clone());
        let alias = element.as_ref().and_then(|e| e.alias.clone());

        match value {
            Value::Array(items) => {
                for item in items {
                    if item.is_array() {
                        return Err(VeilError::format(format!(
                            "nested arrays are not valid FHIR (field '{key}')"
                        )));
                    }
                    add_element(tree, parent, key, declared.as_deref(), alias.as_deref(), item, true)?;
                }
            }
            other => {
                add_element(tree, parent, key, declared.as_deref(), alias.as_deref(), other, false)?
            }
        }
    }
    Ok(())
}

fn add_element(
    tree: &mut RecordTree,
    parent: NodeId,
    name: &str,
    declared: Option<&str>,
    alias: Option<&str>,
    value: &Value,
    array_member: bool,
) -> Result<()> {
    let type_name = declared
        .map(str::to_string)
        .unwrap_or_else(|| infer_type(value));

    let mut node = match value {
        Value::Object(object) => match resource_type(object) {
            Some(nested) => Node::new(name, nested).record(nested),
            None => Node::new(name, type_name.clone()),
        },
        other => {
            let mut node = Node::new(name, type_name.clone());
            node.value = scalar_from_json(other);
            node
        }
    };
    if let Some(alias) = alias {
        node = node.with_alias(alias);
    }
    node = node.in_array(array_member);

    let id = tree.add_child(parent, node);
    if let Value::Object(object) = value {
        let child_type = tree.node(id).type_name.clone();
        add_fields(tree, id, &child_type, object)?;
    }
    Ok(())
}

fn infer_type(value: &Value) -> String {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "decimal",
        Value::String(_) => "string",
        _ => "Element",
    }
    .to_string()
}

/// JSON primitive to scalar; `null` and containers give `None`
pub(crate) fn scalar_from_json(value: &Value) -> Option<Scalar> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(Scalar::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Integer(i)),
            None => n.as_f64().map(Scalar::Decimal),
        },
        Value::String(s) => Some(Scalar::String(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Scalar to JSON; non-finite decimals become `null`
pub(crate) fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::String(s) => Value::String(s.clone()),
        Scalar::Integer(i) => Value::Number((*i).into()),
        Scalar::Decimal(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        Scalar::Boolean(b) => Value::Bool(*b),
    }
}

/// Serializes a FHIR record tree back to JSON
pub fn to_json(tree: &RecordTree) -> Result<Value> {
    if tree.format() != RecordFormat::Fhir {
        return Err(VeilError::format("record tree is not a FHIR resource"));
    }
    Ok(node_to_json(tree, tree.root()))
}

fn node_to_json(tree: &RecordTree, id: NodeId) -> Value {
    let node = tree.node(id);
    let children = tree.children(id);

    if children.is_empty() && node.record_type.is_none() {
        return node.value.as_ref().map(scalar_to_json).unwrap_or(Value::Null);
    }

    let mut object = Map::new();
    if let Some(record_type) = &node.record_type {
        object.insert("resourceType".to_string(), Value::String(record_type.clone()));
    }

    // group by field name in first-appearance order
    let mut groups: Vec<(&str, Vec<Value>, bool)> = Vec::new();
    for child in children {
        let child_node = tree.node(*child);
        let value = node_to_json(tree, *child);
        match groups.iter_mut().find(|(name, _, _)| *name == child_node.name) {
            Some((_, values, is_array)) => {
                values.push(value);
                *is_array = true;
            }
            None => groups.push((&child_node.name, vec![value], child_node.array_member)),
        }
    }
    for (name, mut values, is_array) in groups {
        let value = if is_array {
            Value::Array(values)
        } else {
            values.pop().unwrap_or(Value::Null)
        };
        object.insert(name.to_string(), value);
    }
    Value::Object(object)
}
