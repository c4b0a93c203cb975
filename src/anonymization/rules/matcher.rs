//! Rule-to-node matching for one record
//!
//! A [`RecordMatcher`] is built per record root. It filters the rule table
//! down to the rules in scope for that record and precomputes which type
//! rule owns each node: when several type rules reach a node through
//! different ancestors, the closest ancestor wins, then the lower priority,
//! then the earlier declaration.

use std::collections::HashMap;

use super::compiler::{CompiledRule, CompiledRules};
use super::selector::Selector;
use crate::domain::{NodeId, RecordTree};

/// True when `rule` may apply inside the record rooted at `record`
pub fn in_scope(rule: &CompiledRule, tree: &RecordTree, record: NodeId) -> bool {
    let record_type = tree.node(record).record_type.as_deref();
    let scope_ok = match rule.scope.as_deref() {
        None => true,
        Some(scope) => record_type == Some(scope),
    };
    let bound_ok = match rule.selector.record_type() {
        None => true,
        Some(bound) => record_type == Some(bound),
    };
    scope_ok && bound_ok
}

/// Nodes of the record a selector names, in document order
///
/// Never returns nodes inside nested record roots.
pub fn select(selector: &Selector, tree: &RecordTree, record: NodeId) -> Vec<NodeId> {
    match selector {
        Selector::PathExpression(query) => query.evaluate(tree, record),
        _ => tree
            .descendants_within_record(record)
            .into_iter()
            .filter(|id| matches_node(selector, tree, *id))
            .collect(),
    }
}

/// Tests one node against a non-expression selector
pub fn matches_node(selector: &Selector, tree: &RecordTree, node: NodeId) -> bool {
    match selector {
        Selector::ExactPath {
            record_type,
            fields,
        } => {
            let chain = chain_from_record(tree, node);
            let Some((root, rest)) = chain.split_first() else {
                return false;
            };
            rest.len() == fields.len()
                && (record_type == "Resource"
                    || tree.node(*root).record_type.as_deref() == Some(record_type.as_str()))
                && rest
                    .iter()
                    .zip(fields)
                    .all(|(id, field)| tree.node(*id).answers_to(field))
        }
        Selector::ExactTag(tag) => tree.node(node).tag == Some(*tag),
        Selector::WildcardMask(mask) => mask.matches(tree, &chain_from_record(tree, node)),
        Selector::TypeTag { type_name, .. } => tree.node(node).type_name == *type_name,
        Selector::PathExpression(_) => false,
    }
}

/// Enclosing record root first, `node` last
fn chain_from_record(tree: &RecordTree, node: NodeId) -> Vec<NodeId> {
    let mut chain = tree.ancestors_within_record(node);
    chain.reverse();
    chain.push(node);
    chain
}

/// Rules applicable to one record, with type-rule ownership resolved
pub struct RecordMatcher<'r> {
    rules: Vec<&'r CompiledRule>,
    type_owner: HashMap<NodeId, usize>,
}

impl<'r> RecordMatcher<'r> {
    pub fn new(rules: &'r CompiledRules, tree: &RecordTree, record: NodeId) -> Self {
        let rules: Vec<&CompiledRule> = rules
            .iter()
            .filter(|rule| in_scope(rule, tree, record))
            .collect();
        let type_owner = resolve_type_owners(&rules, tree, record);
        Self { rules, type_owner }
    }

    /// Rules in declaration order
    pub fn rules(&self) -> &[&'r CompiledRule] {
        &self.rules
    }

    /// Whether `rule` may transform `node` while walking a matched subtree
    ///
    /// Non-type rules always may; a type rule only on nodes it owns.
    pub fn owns(&self, rule: &CompiledRule, node: NodeId) -> bool {
        if !rule.selector.is_type_tag() {
            return true;
        }
        self.type_owner.get(&node) == Some(&rule.index)
    }
}

fn resolve_type_owners(
    rules: &[&CompiledRule],
    tree: &RecordTree,
    record: NodeId,
) -> HashMap<NodeId, usize> {
    let type_rules: Vec<&CompiledRule> = rules
        .iter()
        .copied()
        .filter(|r| r.selector.is_type_tag())
        .collect();
    let mut owners = HashMap::new();
    if type_rules.is_empty() {
        return owners;
    }

    // Pre-order walk: each node inherits the owner of its closest typed ancestor
    let mut stack: Vec<(NodeId, Option<&CompiledRule>)> = vec![(record, None)];
    while let Some((node, inherited)) = stack.pop() {
        let own = type_rules
            .iter()
            .copied()
            .filter(|r| r.selector.type_name() == Some(tree.node(node).type_name.as_str()))
            .min_by_key(|r| (r.priority, r.index));
        let owner = own.or(inherited);
        if let Some(rule) = owner {
            owners.insert(node, rule.index);
        }
        for child in tree.children(node).iter().rev() {
            if !tree.is_record_root(*child) {
                stack.push((*child, owner));
            }
        }
    }
    owners
}
