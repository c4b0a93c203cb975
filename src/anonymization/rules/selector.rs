//! Rule selectors
//!
//! Selector text is tried against each form in a fixed order, first success
//! wins:
//!
//! 1. exact tag `(0010,0010)` / `0010,0010` / `00100010`, or exact path
//!    `Patient.address.city`
//! 2. wildcard mask: tag family `(50xx,xxxx)` or name family `Patient.*.family`
//! 3. type tag: `nodesByType('date')`, `Patient.nodesByType('date')`, or a bare
//!    DICOM VR such as `PN`
//! 4. path expression (see [`path_query`](super::path_query))
//! 5. DICOM keyword, resolved to an exact tag

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use super::path_query::PathQuery;
use crate::adapters::dicom::dictionary;
use crate::domain::semantic::is_dicom_vr;
use crate::domain::{Node, NodeId, RecordTree, SelectorError, Tag};

/// One segment of a name wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSegment {
    Literal(String),
    /// `*`: exactly one segment
    Any,
    /// `**`: one or more segments
    AnyMany,
}

/// Wildcard selector families
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardMask {
    /// Tag bits compared under a mask
    Tag { mask: u32, value: u32 },
    /// Path pattern with `*` and `**`
    Name(Vec<NameSegment>),
}

/// Parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Record type (or `Resource`) followed by field names
    ExactPath {
        record_type: String,
        fields: Vec<String>,
    },
    ExactTag(Tag),
    WildcardMask(WildcardMask),
    /// Nodes of a semantic type, optionally bound to a record type
    TypeTag {
        record_type: Option<String>,
        type_name: String,
    },
    PathExpression(PathQuery),
}

fn exact_path() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+$")
            .expect("static exact path pattern")
    })
}

fn tag_mask() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\(?([0-9A-Fa-fxX]{4}),?([0-9A-Fa-fxX]{4})\)?$").expect("static tag mask pattern")
    })
}

fn name_wildcard() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\*\*|\*|[A-Za-z_][A-Za-z0-9_]*)(?:\.(?:\*\*|\*|[A-Za-z_][A-Za-z0-9_]*))*$")
            .expect("static name wildcard pattern")
    })
}

fn type_tag() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:([A-Z][A-Za-z]*)\.)?nodesByType\('([^']+)'\)$").expect("static type tag pattern")
    })
}

impl Selector {
    /// Parses selector text
    ///
    /// # Errors
    ///
    /// [`SelectorError::InvalidSelector`] when no form accepts the text,
    /// [`SelectorError::Ambiguous`] for wildcards that would match everything.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SelectorError::InvalidSelector(text.to_string()));
        }

        if let Ok(tag) = text.parse::<Tag>() {
            return Ok(Self::ExactTag(tag));
        }
        if exact_path().is_match(text) {
            let mut parts = text.split('.').map(str::to_string);
            let record_type = parts.next().unwrap_or_default();
            return Ok(Self::ExactPath {
                record_type,
                fields: parts.collect(),
            });
        }

        if let Some(mask) = parse_wildcard(text)? {
            return Ok(Self::WildcardMask(mask));
        }

        if let Some(captures) = type_tag().captures(text) {
            return Ok(Self::TypeTag {
                record_type: captures
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .filter(|t| t != "Resource"),
                type_name: captures[2].to_string(),
            });
        }
        if is_dicom_vr(text) {
            return Ok(Self::TypeTag {
                record_type: None,
                type_name: text.to_string(),
            });
        }

        if let Ok(query) = PathQuery::parse(text) {
            return Ok(Self::PathExpression(query));
        }

        if let Some(entry) = dictionary::by_keyword(text) {
            return Ok(Self::ExactTag(entry.tag));
        }

        Err(SelectorError::InvalidSelector(text.to_string()))
    }

    /// True for selectors naming a node directly (exact path or exact tag)
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::ExactPath { .. } | Self::ExactTag(_))
    }

    pub fn is_type_tag(&self) -> bool {
        matches!(self, Self::TypeTag { .. })
    }

    /// Record type the selector itself is bound to
    pub fn record_type(&self) -> Option<&str> {
        match self {
            Self::ExactPath { record_type, .. } if record_type != "Resource" => {
                Some(record_type.as_str())
            }
            Self::TypeTag { record_type, .. } => record_type.as_deref(),
            Self::PathExpression(query) => query.record_type(),
            _ => None,
        }
    }

    /// Declared type of a type-tag selector
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::TypeTag { type_name, .. } => Some(type_name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactPath {
                record_type,
                fields,
            } => write!(f, "{}.{}", record_type, fields.join(".")),
            Self::ExactTag(tag) => write!(f, "{tag}"),
            Self::WildcardMask(WildcardMask::Tag { mask, value }) => {
                let text: String = (0..8)
                    .map(|i| {
                        let shift = (7 - i) * 4;
                        if (mask >> shift) & 0xF == 0 {
                            'x'
                        } else {
                            char::from_digit((value >> shift) & 0xF, 16)
                                .map(|c| c.to_ascii_uppercase())
                                .unwrap_or('?')
                        }
                    })
                    .collect();
                write!(f, "({},{})", &text[..4], &text[4..])
            }
            Self::WildcardMask(WildcardMask::Name(segments)) => {
                let parts: Vec<&str> = segments
                    .iter()
                    .map(|s| match s {
                        NameSegment::Literal(name) => name.as_str(),
                        NameSegment::Any => "*",
                        NameSegment::AnyMany => "**",
                    })
                    .collect();
                write!(f, "{}", parts.join("."))
            }
            Self::TypeTag {
                record_type: Some(record_type),
                type_name,
            } => write!(f, "{record_type}.nodesByType('{type_name}')"),
            Self::TypeTag {
                record_type: None,
                type_name,
            } => write!(f, "nodesByType('{type_name}')"),
            Self::PathExpression(query) => write!(f, "{query}"),
        }
    }
}

fn parse_wildcard(text: &str) -> Result<Option<WildcardMask>, SelectorError> {
    if let Some(captures) = tag_mask().captures(text) {
        let digits = format!("{}{}", &captures[1], &captures[2]);
        if digits.chars().any(|c| c == 'x' || c == 'X') {
            let mut mask = 0u32;
            let mut value = 0u32;
            for c in digits.chars() {
                mask <<= 4;
                value <<= 4;
                if let Some(nibble) = c.to_digit(16) {
                    mask |= 0xF;
                    value |= nibble;
                }
            }
            if mask == 0 {
                return Err(SelectorError::Ambiguous {
                    selector: text.to_string(),
                    reason: "a tag mask without fixed digits matches every attribute".to_string(),
                });
            }
            return Ok(Some(WildcardMask::Tag { mask, value }));
        }
    }

    if text.contains('*') && name_wildcard().is_match(text) {
        let segments: Vec<NameSegment> = text
            .split('.')
            .map(|part| match part {
                "*" => NameSegment::Any,
                "**" => NameSegment::AnyMany,
                name => NameSegment::Literal(name.to_string()),
            })
            .collect();
        if segments.iter().all(|s| *s == NameSegment::AnyMany) {
            return Err(SelectorError::Ambiguous {
                selector: text.to_string(),
                reason: "a pattern of only '**' matches every node".to_string(),
            });
        }
        if segments
            .windows(2)
            .any(|w| w[0] == NameSegment::AnyMany && w[1] == NameSegment::AnyMany)
        {
            return Err(SelectorError::Ambiguous {
                selector: text.to_string(),
                reason: "adjacent '**' segments".to_string(),
            });
        }
        return Ok(Some(WildcardMask::Name(segments)));
    }

    Ok(None)
}

impl WildcardMask {
    /// Matches a node given its chain from the record root (root first)
    pub fn matches(&self, tree: &RecordTree, chain: &[NodeId]) -> bool {
        match self {
            Self::Tag { mask, value } => chain
                .last()
                .and_then(|id| tree.node(*id).tag)
                .is_some_and(|tag| tag.as_u32() & mask == *value),
            Self::Name(segments) => {
                let nodes: Vec<&Node> = chain.iter().map(|id| tree.node(*id)).collect();
                match_segments(segments, &nodes, true)
            }
        }
    }
}

fn segment_matches(segment: &str, node: &Node, is_root: bool) -> bool {
    if is_root {
        segment == "Resource" || node.record_type.as_deref() == Some(segment)
    } else {
        node.answers_to(segment)
    }
}

fn match_segments(segments: &[NameSegment], nodes: &[&Node], at_root: bool) -> bool {
    match (segments.split_first(), nodes.split_first()) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some((segment, rest_segments)), Some((node, rest_nodes))) => match segment {
            NameSegment::Literal(name) => {
                segment_matches(name, node, at_root)
                    && match_segments(rest_segments, rest_nodes, false)
            }
            NameSegment::Any => match_segments(rest_segments, rest_nodes, false),
            NameSegment::AnyMany => (1..=nodes.len())
                .any(|taken| match_segments(rest_segments, &nodes[taken..], false)),
        },
    }
}
