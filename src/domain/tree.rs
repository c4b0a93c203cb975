//! Arena-backed record tree
//!
//! Both source formats (FHIR JSON resources and DICOM JSON datasets) are
//! loaded into a [`RecordTree`]: a flat arena of [`Node`]s addressed by
//! [`NodeId`]. Children are ordered index lists, parents are non-owning
//! indexes used only for path reconstruction.
//!
//! A node carrying a `record_type` is a *record root*. The tree root is always
//! one; nested independent sub-documents (bundle entries, contained
//! resources, sequence items) are record roots further down. Traversal helpers
//! suffixed `_within_record` never step into a nested record root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::VeilError;

/// Index of a node inside its [`RecordTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0
    }
}

/// Source format of a record tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// FHIR JSON resources
    #[default]
    Fhir,
    /// DICOM JSON datasets
    Dicom,
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fhir => write!(f, "fhir"),
            Self::Dicom => write!(f, "dicom"),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = VeilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fhir" | "json" => Ok(Self::Fhir),
            "dicom" | "dicom-json" | "dcm" => Ok(Self::Dicom),
            _ => Err(VeilError::Other(format!(
                "Invalid record format: {s}. Expected 'fhir' or 'dicom'"
            ))),
        }
    }
}

/// DICOM attribute tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Tag packed as `0xGGGGEEEE`
    pub fn as_u32(self) -> u32 {
        ((self.group as u32) << 16) | self.element as u32
    }

    pub fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u16, (value & 0xFFFF) as u16)
    }

    /// Eight upper-case hex digits, the DICOM JSON key form
    pub fn to_key(self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl FromStr for Tag {
    type Err = VeilError;

    /// Accepts `(gggg,eeee)`, `gggg,eeee` and `ggggeeee`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .chars()
            .filter(|c| *c != ',')
            .collect();
        if cleaned.len() != 8 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VeilError::format(format!("Invalid DICOM tag: {s}")));
        }
        let value = u32::from_str_radix(&cleaned, 16)
            .map_err(|e| VeilError::format(format!("Invalid DICOM tag {s}: {e}")))?;
        Ok(Self::from_u32(value))
    }
}

/// Scalar value held by a leaf node
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
}

impl Scalar {
    /// String slice for string scalars
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the scalar, parsing numeric strings
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Decimal(d) => Some(*d),
            Self::String(s) => s.trim().parse().ok(),
            Self::Boolean(_) => None,
        }
    }

    /// Text rendering used by hashing, encryption and predicates
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One element of a record tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Field name (FHIR) or keyword/tag key (DICOM)
    pub name: String,

    /// Semantic type: FHIR type name or DICOM VR
    pub type_name: String,

    /// Scalar value, `None` for complex or empty nodes
    pub value: Option<Scalar>,

    /// DICOM tag, if any
    pub tag: Option<Tag>,

    /// Set on record roots: the resource type or dataset kind
    pub record_type: Option<String>,

    /// Base name of a FHIR choice element (`value` for `valueQuantity`)
    pub alias: Option<String>,

    /// Serialized as a JSON array member
    pub array_member: bool,

    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    /// Creates a complex node without value
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: None,
            tag: None,
            record_type: None,
            alias: None,
            array_member: false,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Creates a leaf node with a value
    pub fn leaf(name: impl Into<String>, type_name: impl Into<String>, value: Scalar) -> Self {
        let mut node = Self::new(name, type_name);
        node.value = Some(value);
        node
    }

    /// Marks the node as a record root of the given type
    pub fn record(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn in_array(mut self, array_member: bool) -> Self {
        self.array_member = array_member;
        self
    }

    /// True when the node's name or choice alias equals `segment`
    pub fn answers_to(&self, segment: &str) -> bool {
        self.name == segment || self.alias.as_deref() == Some(segment)
    }

    /// Copy of the node's own data without structural links
    fn detached_copy(&self) -> Self {
        Self {
            children: Vec::new(),
            parent: None,
            ..self.clone()
        }
    }
}

/// Arena of nodes forming one top-level record
#[derive(Debug, Clone)]
pub struct RecordTree {
    format: RecordFormat,
    nodes: Vec<Node>,
    root: NodeId,
}

impl RecordTree {
    /// Creates a tree whose root is `root`; the root is forced to be a record root
    pub fn new(format: RecordFormat, mut root: Node) -> Self {
        if root.record_type.is_none() {
            root.record_type = Some(root.type_name.clone());
        }
        root.parent = None;
        root.children.clear();
        Self {
            format,
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of arena slots, including detached nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn value(&self, id: NodeId) -> Option<&Scalar> {
        self.nodes[id.0].value.as_ref()
    }

    pub fn set_value(&mut self, id: NodeId, value: Option<Scalar>) {
        self.nodes[id.0].value = value;
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn is_record_root(&self, id: NodeId) -> bool {
        self.nodes[id.0].record_type.is_some()
    }

    /// Appends `node` as the last child of `parent`
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let index = self.nodes[parent.0].children.len();
        self.insert_child(parent, index, node)
    }

    /// Inserts `node` at `index` among the children of `parent`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, id);
        id
    }

    /// Unlinks a node from its parent; the subtree stays in the arena but is unreachable
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    /// True when the node is reachable from the tree root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Nearest ancestor-or-self that is a record root
    pub fn enclosing_record(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            if self.is_record_root(current) {
                return current;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Path segments from the enclosing record root: record type first, then field names
    pub fn path_segments(&self, id: NodeId) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let node = &self.nodes[current.0];
            if let Some(record_type) = &node.record_type {
                segments.push(record_type.as_str());
                break;
            }
            segments.push(node.name.as_str());
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        segments
    }

    /// Dotted path from the enclosing record root, e.g. `Patient.name.given`
    pub fn path(&self, id: NodeId) -> String {
        self.path_segments(id).join(".")
    }

    /// Ancestor chain inside the enclosing record, nearest first, excluding `id`
    pub fn ancestors_within_record(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        if self.is_record_root(id) {
            return ancestors;
        }
        let mut current = id;
        while let Some(parent) = self.nodes[current.0].parent {
            ancestors.push(parent);
            if self.is_record_root(parent) {
                break;
            }
            current = parent;
        }
        ancestors
    }

    /// Pre-order list of `id` and its descendants, not entering nested record roots
    pub fn descendants_within_record(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.nodes[current.0].children.iter().rev() {
                if !self.is_record_root(*child) {
                    stack.push(*child);
                }
            }
        }
        out
    }

    /// Nearest nested record roots below `id`, in document order
    pub fn nested_records(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_record_root(current) {
                out.push(current);
                continue;
            }
            for child in self.nodes[current.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Children answering to `name`, excluding nested record roots
    pub fn children_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| !self.is_record_root(*child) && self.nodes[child.0].answers_to(name))
            .collect()
    }

    /// First child whose name is exactly `name`, record roots included
    pub fn child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].name == name)
    }

    /// Deep-copies the subtree rooted at `source_id` of `source` under `parent`
    pub fn graft(&mut self, parent: NodeId, source: &RecordTree, source_id: NodeId) -> NodeId {
        let copy = source.node(source_id).detached_copy();
        let new_id = self.add_child(parent, copy);
        for child in source.children(source_id) {
            self.graft(new_id, source, *child);
        }
        new_id
    }
}
