//! DICOM JSON model (PS3.18 F.2) to record tree conversion
//!
//! Each attribute becomes one node named by its keyword (or its tag key when
//! the dictionary does not know it), typed by its VR and carrying its tag.
//! Multi-valued attributes are held as one backslash-joined string, the
//! native DICOM convention. Sequence items become nested record roots of type
//! `Item`.

use serde_json::{json, Map, Number, Value};

use super::dictionary;
use crate::domain::{Node, NodeId, RecordFormat, RecordTree, Result, Scalar, Tag, VeilError};

/// Record type of the top-level dataset
pub const DATASET: &str = "Dataset";
/// Record type of sequence items
pub const ITEM: &str = "Item";

const BINARY_VRS: &[&str] = &["OB", "OD", "OF", "OL", "OV", "OW", "UN"];
const NUMBER_VRS: &[&str] = &["DS", "FD", "FL", "IS", "SL", "SS", "SV", "UL", "US", "UV"];

/// Builds a record tree from a DICOM JSON dataset
pub fn from_json(value: &Value) -> Result<RecordTree> {
    let object = value
        .as_object()
        .ok_or_else(|| VeilError::format("DICOM dataset must be a JSON object"))?;
    let mut tree = RecordTree::new(
        RecordFormat::Dicom,
        Node::new(DATASET, DATASET).record(DATASET),
    );
    let root = tree.root();
    add_attributes(&mut tree, root, object)?;
    Ok(tree)
}

fn add_attributes(tree: &mut RecordTree, parent: NodeId, object: &Map<String, Value>) -> Result<()> {
    let mut attributes: Vec<(Tag, &Value)> = object
        .iter()
        .map(|(key, value)| Ok((key.parse::<Tag>()?, value)))
        .collect::<Result<_>>()?;
    attributes.sort_by_key(|(tag, _)| *tag);

    for (tag, attribute) in attributes {
        let attribute = attribute
            .as_object()
            .ok_or_else(|| VeilError::format(format!("attribute {tag} must be an object")))?;
        let known = dictionary::by_tag(tag);
        let vr = attribute
            .get("vr")
            .and_then(Value::as_str)
            .or_else(|| known.map(|e| e.vr))
            .unwrap_or("UN");
        let name = known
            .map(|e| e.keyword.to_string())
            .unwrap_or_else(|| tag.to_key());

        let id = tree.add_child(parent, Node::new(name, vr).with_tag(tag));

        if vr == "SQ" {
            for item in attribute.get("Value").and_then(Value::as_array).into_iter().flatten() {
                let item = item.as_object().ok_or_else(|| {
                    VeilError::format(format!("sequence item of {tag} must be an object"))
                })?;
                let item_id = tree.add_child(id, Node::new(ITEM, ITEM).record(ITEM).in_array(true));
                add_attributes(tree, item_id, item)?;
            }
            continue;
        }

        let value = if let Some(values) = attribute.get("Value").and_then(Value::as_array) {
            element_value(vr, values, tag)?
        } else if let Some(inline) = attribute.get("InlineBinary").and_then(Value::as_str) {
            Some(Scalar::String(inline.to_string()))
        } else {
            attribute
                .get("BulkDataURI")
                .and_then(Value::as_str)
                .map(|uri| Scalar::String(uri.to_string()))
        };
        tree.set_value(id, value);
    }
    Ok(())
}

fn element_value(vr: &str, values: &[Value], tag: Tag) -> Result<Option<Scalar>> {
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        let item = match value {
            Value::Null => Scalar::String(String::new()),
            Value::String(s) => Scalar::String(s.clone()),
            Value::Bool(b) => Scalar::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Integer(i),
                None => Scalar::Decimal(n.as_f64().unwrap_or_default()),
            },
            Value::Object(pn) if vr == "PN" => Scalar::String(
                pn.get("Alphabetic")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            _ => {
                return Err(VeilError::format(format!(
                    "unsupported value in attribute {tag}"
                )))
            }
        };
        items.push(item);
    }
    Ok(match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(Scalar::String(
            items.iter().map(Scalar::to_text).collect::<Vec<_>>().join("\\"),
        )),
    })
}

/// Serializes a DICOM record tree back to the JSON model
pub fn to_json(tree: &RecordTree) -> Result<Value> {
    if tree.format() != RecordFormat::Dicom {
        return Err(VeilError::format("record tree is not a DICOM dataset"));
    }
    Ok(dataset_to_json(tree, tree.root()))
}

fn dataset_to_json(tree: &RecordTree, dataset: NodeId) -> Value {
    let mut object = Map::new();
    for child in tree.children(dataset) {
        let node = tree.node(*child);
        let Some(tag) = node.tag else { continue };
        let vr = node.type_name.as_str();
        let mut attribute = Map::new();
        attribute.insert("vr".to_string(), Value::String(vr.to_string()));

        if vr == "SQ" {
            let items: Vec<Value> = tree
                .children(*child)
                .iter()
                .map(|item| dataset_to_json(tree, *item))
                .collect();
            if !items.is_empty() {
                attribute.insert("Value".to_string(), Value::Array(items));
            }
        } else if let Some(value) = &node.value {
            let (key, encoded) = encode_value(vr, value);
            attribute.insert(key.to_string(), encoded);
        }
        object.insert(tag.to_key(), Value::Object(attribute));
    }
    Value::Object(object)
}

fn encode_value(vr: &str, value: &Scalar) -> (&'static str, Value) {
    if BINARY_VRS.contains(&vr) {
        let text = value.to_text();
        let key = if text.contains("://") {
            "BulkDataURI"
        } else {
            "InlineBinary"
        };
        return (key, Value::String(text));
    }

    let parts: Vec<Value> = match value {
        Scalar::String(s) => s
            .split('\\')
            .map(|part| encode_part(vr, part))
            .collect(),
        Scalar::Integer(i) => vec![json!(i)],
        Scalar::Decimal(d) => vec![Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)],
        Scalar::Boolean(b) => vec![json!(b)],
    };
    ("Value", Value::Array(parts))
}

fn encode_part(vr: &str, part: &str) -> Value {
    if vr == "PN" {
        return json!({ "Alphabetic": part });
    }
    if NUMBER_VRS.contains(&vr) {
        if let Ok(i) = part.trim().parse::<i64>() {
            return json!(i);
        }
        if let Some(n) = part.trim().parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(part.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Value {
        json!({
            "00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^John"}]},
            "00100020": {"vr": "LO", "Value": ["MRN-42"]},
            "00100030": {"vr": "DA", "Value": ["19740115"]},
            "00081110": {"vr": "SQ", "Value": [
                {"00081155": {"vr": "UI", "Value": ["1.2.3.4"]}}
            ]},
            "00280010": {"vr": "US", "Value": [512]},
            "00200037": {"vr": "DS", "Value": [1, 0, 0, 0, 1, 0]}
        })
    }

    #[test]
    fn test_attributes_named_by_keyword() {
        let tree = from_json(&dataset()).unwrap();
        let root = tree.root();
        let name = tree.child_named(root, "PatientName").unwrap();
        assert_eq!(tree.node(name).type_name, "PN");
        assert_eq!(tree.node(name).tag, Some(Tag::new(0x0010, 0x0010)));
        assert_eq!(tree.value(name), Some(&Scalar::String("Doe^John".to_string())));

        let unknown = tree.child_named(root, "00200037").unwrap();
        assert_eq!(
            tree.value(unknown),
            Some(&Scalar::String("1\\0\\0\\0\\1\\0".to_string()))
        );
    }

    #[test]
    fn test_sequence_items_are_record_roots() {
        let tree = from_json(&dataset()).unwrap();
        let items = tree.nested_records(tree.root());
        assert_eq!(items.len(), 1);
        assert_eq!(tree.node(items[0]).record_type.as_deref(), Some(ITEM));
    }

    #[test]
    fn test_round_trip() {
        let original = dataset();
        let tree = from_json(&original).unwrap();
        assert_eq!(to_json(&tree).unwrap(), original);
    }

    #[test]
    fn test_invalid_tag_rejected() {
        assert!(from_json(&json!({"PatientName": {"vr": "PN"}})).is_err());
        assert!(from_json(&json!("00100010")).is_err());
    }

    #[test]
    fn test_inline_binary_preserved() {
        let original = json!({"7FE00010": {"vr": "OW", "InlineBinary": "AAEC"}});
        let tree = from_json(&original).unwrap();
        assert_eq!(to_json(&tree).unwrap(), original);
    }
}
