//! Path expressions
//!
//! A restricted path language evaluated against one record root:
//!
//! - `Patient.name.given` child steps, matching field names or choice bases
//! - `entry[0]` zero-based index into the current collection
//! - `where(use='official')`, `where(system != 'x')` filters on a child path
//! - `ofType(Quantity)` keeps nodes of the given type
//! - `nodesByName('family')`, `nodesByType('date')` descendant searches
//! - `first()`, `last()`
//!
//! Evaluation never enters a nested record root.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::domain::{NodeId, RecordTree, SelectorError};

/// Comparison inside `where(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// One step of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Child(String),
    Index(usize),
    Where {
        path: Vec<String>,
        op: CompareOp,
        value: String,
    },
    OfType(String),
    NodesByName(String),
    NodesByType(String),
    First,
    Last,
}

/// Parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    /// Record type the expression starts from; `None` starts from any record
    record_type: Option<String>,
    steps: Vec<Step>,
    source: String,
}

fn identifier() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)((?:\[\d+\])*)$").expect("static identifier pattern")
    })
}

fn function_call() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)\((.*)\)((?:\[\d+\])*)$").expect("static function pattern")
    })
}

fn where_clause() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*(=|!=)\s*'([^']*)'\s*$")
            .expect("static where pattern")
    })
}

impl PathQuery {
    /// Parses a path expression
    ///
    /// A single bare identifier is not a path expression; it is left to the
    /// keyword lookup that follows in selector precedence.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let invalid = || SelectorError::InvalidSelector(text.to_string());
        let segments = split_segments(text).ok_or_else(invalid)?;
        let (first, rest) = segments.split_first().ok_or_else(invalid)?;

        let mut steps = Vec::new();
        let record_type = match identifier().captures(first) {
            Some(captures) => {
                steps.extend(parse_indexes(captures.get(2).map_or("", |m| m.as_str())));
                Some(captures[1].to_string())
            }
            None => {
                steps.extend(parse_function(first).ok_or_else(invalid)?);
                None
            }
        };

        for segment in rest {
            if let Some(captures) = identifier().captures(segment) {
                steps.push(Step::Child(captures[1].to_string()));
                steps.extend(parse_indexes(captures.get(2).map_or("", |m| m.as_str())));
            } else {
                steps.extend(parse_function(segment).ok_or_else(invalid)?);
            }
        }

        if steps.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            record_type: record_type.filter(|t| t != "Resource"),
            steps,
            source: text.to_string(),
        })
    }

    /// Record type the expression is bound to, if any
    pub fn record_type(&self) -> Option<&str> {
        self.record_type.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Evaluates the expression from `record`, returning matches in document order
    pub fn evaluate(&self, tree: &RecordTree, record: NodeId) -> Vec<NodeId> {
        if let Some(expected) = &self.record_type {
            if tree.node(record).record_type.as_deref() != Some(expected.as_str()) {
                return Vec::new();
            }
        }

        let mut current = vec![record];
        for step in &self.steps {
            current = apply_step(tree, &current, step);
            if current.is_empty() {
                break;
            }
        }
        dedup(current)
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn apply_step(tree: &RecordTree, current: &[NodeId], step: &Step) -> Vec<NodeId> {
    match step {
        Step::Child(name) => current
            .iter()
            .flat_map(|id| tree.children_named(*id, name))
            .collect(),
        Step::Index(index) => current.get(*index).copied().into_iter().collect(),
        Step::First => current.first().copied().into_iter().collect(),
        Step::Last => current.last().copied().into_iter().collect(),
        Step::OfType(type_name) => current
            .iter()
            .copied()
            .filter(|id| tree.node(*id).type_name == *type_name)
            .collect(),
        Step::NodesByName(name) => current
            .iter()
            .flat_map(|id| tree.descendants_within_record(*id).into_iter().skip(1))
            .filter(|id| tree.node(*id).answers_to(name))
            .collect(),
        Step::NodesByType(type_name) => current
            .iter()
            .flat_map(|id| tree.descendants_within_record(*id))
            .filter(|id| tree.node(*id).type_name == *type_name)
            .collect(),
        Step::Where { path, op, value } => current
            .iter()
            .copied()
            .filter(|id| where_holds(tree, *id, path, *op, value))
            .collect(),
    }
}

fn where_holds(tree: &RecordTree, id: NodeId, path: &[String], op: CompareOp, value: &str) -> bool {
    let mut nodes = vec![id];
    for name in path {
        nodes = nodes
            .iter()
            .flat_map(|n| tree.children_named(*n, name))
            .collect();
    }
    let values: Vec<String> = nodes
        .iter()
        .filter_map(|n| tree.value(*n).map(|v| v.to_text()))
        .collect();
    match op {
        CompareOp::Eq => values.iter().any(|v| v == value),
        CompareOp::Ne => !values.is_empty() && values.iter().all(|v| v != value),
    }
}

fn dedup(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = std::collections::HashSet::new();
    nodes.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Splits on dots outside quotes and parentheses
fn split_segments(text: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in text.trim().chars() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.checked_sub(1)?,
            '.' if !quoted && depth == 0 => {
                if current.is_empty() {
                    return None;
                }
                segments.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if quoted || depth != 0 || current.is_empty() {
        return None;
    }
    segments.push(current);
    Some(segments)
}

fn parse_indexes(text: &str) -> Vec<Step> {
    text.split(['[', ']'])
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok().map(Step::Index))
        .collect()
}

fn parse_function(segment: &str) -> Option<Vec<Step>> {
    let captures = function_call().captures(segment)?;
    let argument = captures[2].trim();
    let step = match &captures[1] {
        "where" => {
            let clause = where_clause().captures(argument)?;
            Step::Where {
                path: clause[1].split('.').map(str::to_string).collect(),
                op: if &clause[2] == "=" {
                    CompareOp::Eq
                } else {
                    CompareOp::Ne
                },
                value: clause[3].to_string(),
            }
        }
        "ofType" => Step::OfType(unquote(argument)?),
        "nodesByName" => Step::NodesByName(unquote(argument)?),
        "nodesByType" => Step::NodesByType(unquote(argument)?),
        "first" if argument.is_empty() => Step::First,
        "last" if argument.is_empty() => Step::Last,
        _ => return None,
    };
    let mut steps = vec![step];
    steps.extend(parse_indexes(captures.get(3).map_or("", |m| m.as_str())));
    Some(steps)
}

fn unquote(argument: &str) -> Option<String> {
    let inner = argument
        .strip_prefix('\'')
        .and_then(|a| a.strip_suffix('\''))
        .unwrap_or(argument);
    (!inner.is_empty() && !inner.contains('\'')).then(|| inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fhir;
    use serde_json::json;

    fn patient() -> RecordTree {
        fhir::from_json(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [
                {"use": "official", "family": "Doe", "given": ["John", "Q"]},
                {"use": "nickname", "given": ["Johnny"]}
            ],
            "contained": [
                {"resourceType": "Organization", "id": "o1", "name": "Acme"}
            ]
        }))
        .unwrap()
    }

    fn values(tree: &RecordTree, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .filter_map(|id| tree.value(*id).map(|v| v.to_text()))
            .collect()
    }

    #[test]
    fn test_where_filter() {
        let tree = patient();
        let query = PathQuery::parse("Patient.name.where(use='official').given").unwrap();
        let hits = query.evaluate(&tree, tree.root());
        assert_eq!(values(&tree, &hits), vec!["John", "Q"]);
    }

    #[test]
    fn test_not_equal_filter() {
        let tree = patient();
        let query = PathQuery::parse("Patient.name.where(use != 'official').given").unwrap();
        assert_eq!(values(&tree, &query.evaluate(&tree, tree.root())), vec!["Johnny"]);
    }

    #[test]
    fn test_index_and_last() {
        let tree = patient();
        let first = PathQuery::parse("Patient.name[1].given").unwrap();
        assert_eq!(values(&tree, &first.evaluate(&tree, tree.root())), vec!["Johnny"]);

        let last = PathQuery::parse("Patient.name.given.last()").unwrap();
        assert_eq!(values(&tree, &last.evaluate(&tree, tree.root())), vec!["Johnny"]);
    }

    #[test]
    fn test_nodes_by_name_stays_in_record() {
        let tree = patient();
        let query = PathQuery::parse("Patient.nodesByName('name')").unwrap();
        let hits = query.evaluate(&tree, tree.root());
        // the contained Organization.name is a separate record
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|id| tree.node(*id).type_name == "HumanName"));
    }

    #[test]
    fn test_leading_function_matches_any_record() {
        let tree = patient();
        let query = PathQuery::parse("nodesByType('HumanName').family").unwrap();
        assert_eq!(query.record_type(), None);
        assert_eq!(values(&tree, &query.evaluate(&tree, tree.root())), vec!["Doe"]);
    }

    #[test]
    fn test_wrong_record_type_yields_nothing() {
        let tree = patient();
        let query = PathQuery::parse("Observation.status.first()").unwrap();
        assert!(query.evaluate(&tree, tree.root()).is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(PathQuery::parse("Patient..name").is_err());
        assert!(PathQuery::parse("Patient.name.where(use='x'").is_err());
        assert!(PathQuery::parse("Patient.frobnicate(1)").is_err());
        assert!(PathQuery::parse("").is_err());
    }

    #[test]
    fn test_single_identifier_is_not_an_expression() {
        assert!(PathQuery::parse("PatientName").is_err());
    }
}
