//! Main anonymization engine
//!
//! This module provides the [`AnonymizationEngine`] that applies compiled
//! rules to record trees.
//!
//! # Traversal
//!
//! Every record root (the tree root, then each nested bundle entry,
//! contained resource or sequence item) gets its own rule pass:
//!
//! 1. The rules in scope for the record are evaluated in declaration order.
//! 2. Each matched node is walked together with its descendants, without
//!    entering nested record roots. Every applicable node that no earlier
//!    rule has processed is transformed and marked visited. A substituted
//!    node claims its whole subtree: every node below it is marked visited
//!    and the walk does not descend into it.
//! 3. A rule naming a node by exact path or tag overrides earlier rules: the
//!    node's original value is restored before the rule's method runs.
//! 4. Nested record roots are processed the same way afterwards.
//!
//! Text matched by `ner` rules is collected during the pass and sent to the
//! [`TextAnonymizer`] in one call per top-level record. Security labels are
//! then written from each record's folded [`ProcessResult`], and FHIR nodes
//! left without value or children are pruned.
//!
//! # Examples
//!
//! ```no_run
//! use veil::anonymization::{AnonymizationEngine, config::{AnonymizationConfig, RuleDescriptor}};
//! use veil::domain::RecordFormat;
//! use serde_json::json;
//!
//! # async fn example() -> veil::domain::Result<()> {
//! let config = AnonymizationConfig {
//!     rules: vec![RuleDescriptor::new("Patient.name", "redact")],
//!     ..Default::default()
//! };
//! let engine = AnonymizationEngine::new(&config)?;
//!
//! let patient = json!({
//!     "resourceType": "Patient",
//!     "id": "p1",
//!     "name": [{"family": "Doe"}]
//! });
//! let anonymized = engine.anonymize_json(patient, RecordFormat::Fhir).await?;
//! assert!(anonymized.get("name").is_none());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::adapters;
use crate::anonymization::audit::AuditLogger;
use crate::anonymization::config::AnonymizationConfig;
use crate::anonymization::context::{OperationKind, ProcessContext, ProcessResult};
use crate::anonymization::labels::apply_security_labels;
use crate::anonymization::ner::TextAnonymizer;
use crate::anonymization::rules::matcher::select;
use crate::anonymization::rules::{compile_with, validate_config, CompiledRule, CompiledRules, Method, RecordMatcher};
use crate::anonymization::transforms::{self, Continuation, NoiseSampler, ThreadRngSampler, TransformContext};
use crate::domain::{
    classify, ConfigurationError, NodeId, RecordFormat, RecordTree, Result, Scalar, ValueKind,
    VeilError,
};

/// Outcome of anonymizing one top-level record
#[derive(Debug)]
pub struct AnonymizedRecord {
    /// The mutated tree
    pub tree: RecordTree,

    /// Id of the record before anonymization (FHIR `id`, DICOM SOPInstanceUID)
    pub record_id: Option<String>,

    /// Resource type or dataset kind of the tree root
    pub record_type: Option<String>,

    /// Operations applied anywhere in the tree
    pub result: ProcessResult,

    pub processing_time_ms: u64,

    pub timestamp: DateTime<Utc>,
}

/// Configures an [`AnonymizationEngine`]
pub struct EngineBuilder {
    rules: CompiledRules,
    skip_failed_item: bool,
    noise: Arc<dyn NoiseSampler>,
    text_anonymizer: Option<Arc<dyn TextAnonymizer>>,
    audit_logger: Option<AuditLogger>,
    today: Option<NaiveDate>,
}

impl EngineBuilder {
    /// Starts from already compiled rules
    pub fn new(rules: CompiledRules) -> Self {
        Self {
            rules,
            skip_failed_item: false,
            noise: Arc::new(ThreadRngSampler),
            text_anonymizer: None,
            audit_logger: None,
            today: None,
        }
    }

    /// Compiles the configured rules and opens the audit log
    ///
    /// With `validate_schema` every rule problem is reported at once;
    /// otherwise compilation stops at the first invalid rule.
    pub fn from_config(config: &AnonymizationConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| VeilError::Configuration(ConfigurationError::Invalid(e)))?;

        let rules = if config.validate_schema {
            validate_config(config)?
        } else {
            compile_with(&config.rules, &config.settings, &config.parameters)?
        };

        let mut builder = Self::new(rules).skip_failed_item(config.parameters.skip_failed_item);
        if config.audit.enabled {
            builder = builder.audit_logger(AuditLogger::new(
                config.audit.log_path.clone(),
                config.audit.json_format,
                true,
            )?);
        }
        Ok(builder)
    }

    /// Keep a field's value and continue when its transform fails
    pub fn skip_failed_item(mut self, skip: bool) -> Self {
        self.skip_failed_item = skip;
        self
    }

    pub fn noise_sampler(mut self, noise: Arc<dyn NoiseSampler>) -> Self {
        self.noise = noise;
        self
    }

    pub fn text_anonymizer(mut self, client: Arc<dyn TextAnonymizer>) -> Self {
        self.text_anonymizer = Some(client);
        self
    }

    pub fn audit_logger(mut self, logger: AuditLogger) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    /// Fixes the reference date used for age checks
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// # Errors
    ///
    /// A configuration error when an `ner` rule exists but no
    /// [`TextAnonymizer`] was supplied.
    pub fn build(self) -> Result<AnonymizationEngine> {
        if self.rules.uses_ner() && self.text_anonymizer.is_none() {
            return Err(ConfigurationError::Invalid(
                "rules use the 'ner' method but no text anonymizer is configured".to_string(),
            )
            .into());
        }

        tracing::info!(
            rules = self.rules.len(),
            skip_failed_item = self.skip_failed_item,
            audit = self.audit_logger.is_some(),
            "Anonymization engine ready"
        );

        Ok(AnonymizationEngine {
            rules: self.rules,
            skip_failed_item: self.skip_failed_item,
            noise: self.noise,
            text_anonymizer: self.text_anonymizer,
            audit_logger: self.audit_logger,
            today: self.today,
        })
    }
}

/// Applies compiled rules to record trees
///
/// # Thread Safety
///
/// The engine holds only read-only state and can be shared across tasks
/// behind an `Arc`. All per-record state lives on the stack of one call.
pub struct AnonymizationEngine {
    rules: CompiledRules,
    skip_failed_item: bool,
    noise: Arc<dyn NoiseSampler>,
    text_anonymizer: Option<Arc<dyn TextAnonymizer>>,
    audit_logger: Option<AuditLogger>,
    today: Option<NaiveDate>,
}

/// Mutable state of one top-level record
struct RecordRun<'a> {
    context: ProcessContext,
    /// Each record root's own operations
    results: HashMap<NodeId, ProcessResult>,
    /// Nodes matched by `ner` rules, with their record root
    ner_targets: Vec<(NodeId, NodeId)>,
    today: NaiveDate,
    /// PatientID of the top-level DICOM dataset, read before any rule ran
    dicom_entity: String,
    noise: &'a dyn NoiseSampler,
}

impl AnonymizationEngine {
    /// Create an engine from configuration with default services
    pub fn new(config: &AnonymizationConfig) -> Result<Self> {
        EngineBuilder::from_config(config)?.build()
    }

    pub fn builder(rules: CompiledRules) -> EngineBuilder {
        EngineBuilder::new(rules)
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// Anonymize a record tree, returning only the tree
    pub async fn anonymize(&self, tree: RecordTree) -> Result<RecordTree> {
        Ok(self.anonymize_record(tree).await?.tree)
    }

    /// Anonymize a JSON record in the given format
    pub async fn anonymize_json(&self, value: Value, format: RecordFormat) -> Result<Value> {
        let tree = adapters::from_json(&value, format)?;
        let tree = self.anonymize(tree).await?;
        adapters::to_json(&tree)
    }

    /// Anonymize a record tree
    ///
    /// # Errors
    ///
    /// - [`VeilError::RuleApplication`] when a transform fails and
    ///   `skip_failed_item` is off
    /// - errors of the text anonymizer and the audit log
    pub async fn anonymize_record(&self, mut tree: RecordTree) -> Result<AnonymizedRecord> {
        let start = Instant::now();
        let root = tree.root();
        let record_id = record_identity(&tree);
        let record_type = tree.node(root).record_type.clone();

        let mut run = RecordRun {
            context: ProcessContext::new(),
            results: HashMap::new(),
            ner_targets: Vec::new(),
            today: self.today.unwrap_or_else(|| Local::now().date_naive()),
            dicom_entity: dicom_text(&tree, "PatientID").unwrap_or_default(),
            noise: self.noise.as_ref(),
        };

        self.process_record(&mut tree, root, &mut run)?;
        if !run.ner_targets.is_empty() {
            self.anonymize_text(&mut tree, &mut run).await?;
        }
        let result = fold_results(&mut tree, root, &run.results);
        if tree.format() == RecordFormat::Fhir {
            prune_empty(&mut tree);
        }

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            record_type = record_type.as_deref().unwrap_or("-"),
            changes = result.total(),
            processing_time_ms,
            "Record anonymized"
        );

        let record = AnonymizedRecord {
            tree,
            record_id,
            record_type,
            result,
            processing_time_ms,
            timestamp: Utc::now(),
        };
        if let Some(logger) = &self.audit_logger {
            logger.log_record(&record)?;
        }
        Ok(record)
    }

    /// Rule pass over one record root, then over its nested record roots
    fn process_record(&self, tree: &mut RecordTree, record: NodeId, run: &mut RecordRun<'_>) -> Result<()> {
        let entity_id = match tree.format() {
            RecordFormat::Fhir => tree
                .child_named(record, "id")
                .and_then(|id| tree.value(id))
                .map(Scalar::to_text)
                .unwrap_or_default(),
            RecordFormat::Dicom => run.dicom_entity.clone(),
        };

        let matcher = RecordMatcher::new(&self.rules, tree, record);
        let mut result = ProcessResult::new();
        for rule in matcher.rules() {
            for node in select(&rule.selector, tree, record) {
                if tree.is_attached(node) {
                    self.walk(tree, &matcher, rule, node, record, &entity_id, run, &mut result)?;
                }
            }
        }
        run.results.insert(record, result);

        // collected after the pass: rules may have removed or replaced nested records
        for nested in tree.nested_records(record) {
            self.process_record(tree, nested, run)?;
        }
        Ok(())
    }

    /// Applies `rule` to `start` and its descendants inside the record
    #[allow(clippy::too_many_arguments)]
    fn walk(
        &self,
        tree: &mut RecordTree,
        matcher: &RecordMatcher<'_>,
        rule: &CompiledRule,
        start: NodeId,
        record: NodeId,
        entity_id: &str,
        run: &mut RecordRun<'_>,
        result: &mut ProcessResult,
    ) -> Result<()> {
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            let forced = node == start && rule.selector.is_exact();
            let applicable = matcher.owns(rule, node) && (forced || !run.context.is_visited(node));

            let continuation = if applicable {
                self.apply_rule(tree, rule, node, record, entity_id, forced, run, result)?
            } else {
                Continuation::Descend
            };

            match continuation {
                Continuation::Descend => {
                    for child in tree.children(node).iter().rev() {
                        if !tree.is_record_root(*child) {
                            stack.push(*child);
                        }
                    }
                }
                Continuation::Stop => {}
                Continuation::ClaimSubtree => {
                    for id in tree.descendants_within_record(node) {
                        run.context.mark_visited(id);
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_rule(
        &self,
        tree: &mut RecordTree,
        rule: &CompiledRule,
        node: NodeId,
        record: NodeId,
        entity_id: &str,
        forced: bool,
        run: &mut RecordRun<'_>,
        result: &mut ProcessResult,
    ) -> Result<Continuation> {
        if forced && run.context.is_visited(node) {
            if let Some(original) = run.context.original(node).cloned() {
                tree.set_value(node, original);
            }
        }

        if matches!(rule.method, Method::Ner) {
            if matches!(tree.value(node), Some(Scalar::String(_))) {
                run.ner_targets.push((record, node));
            }
            run.context.mark_visited(node);
            return Ok(Continuation::Descend);
        }

        let deep = match &rule.method {
            Method::Substitute(_) => true,
            Method::Redact(_) => classify(&tree.node(node).type_name) == ValueKind::Age,
            _ => false,
        };
        if deep {
            for id in tree.descendants_within_record(node) {
                run.context.remember(id, tree.value(id).cloned());
            }
        } else {
            run.context.remember(node, tree.value(node).cloned());
        }

        let ctx = TransformContext {
            today: run.today,
            entity_id,
            noise: run.noise,
            visited: run.context.visited(),
        };
        let outcome = match transforms::apply(&rule.method, tree, node, &ctx) {
            Ok(outcome) => outcome,
            Err(e) if self.skip_failed_item => {
                tracing::warn!(
                    rule = %rule.source,
                    method = rule.method.name(),
                    path = %tree.path(node),
                    error = %e,
                    "Transform failed, keeping original value"
                );
                if let Some(original) = run.context.original(node).cloned() {
                    tree.set_value(node, original);
                }
                transforms::Outcome::unchanged()
            }
            Err(e) => {
                return Err(VeilError::RuleApplication {
                    rule: rule.source.clone(),
                    path: tree.path(node),
                    message: e.to_string(),
                })
            }
        };

        run.context.mark_visited(node);
        if let Some(kind) = outcome.kind {
            result.record(kind);
        }
        Ok(outcome.continuation)
    }

    /// Sends collected free text to the text anonymizer in one batch
    async fn anonymize_text(&self, tree: &mut RecordTree, run: &mut RecordRun<'_>) -> Result<()> {
        let Some(client) = &self.text_anonymizer else {
            return Err(ConfigurationError::Invalid("no text anonymizer configured".to_string()).into());
        };

        let texts: Vec<String> = run
            .ner_targets
            .iter()
            .map(|(_, node)| tree.value(*node).map(Scalar::to_text).unwrap_or_default())
            .collect();
        let expected = texts.len();
        tracing::debug!(texts = expected, "Sending free text to text anonymizer");

        let outputs = client.anonymize_text(texts.clone()).await?;
        if outputs.len() != expected {
            return Err(VeilError::Other(format!(
                "text anonymizer returned {} results for {expected} inputs",
                outputs.len()
            )));
        }

        for (((record, node), input), output) in run.ner_targets.iter().zip(texts).zip(outputs) {
            if input == output {
                continue;
            }
            tree.set_value(*node, Some(Scalar::String(output)));
            run.results
                .entry(*record)
                .or_default()
                .record(OperationKind::TextAnonymized);
        }
        Ok(())
    }
}

/// Post-order fold of record results, writing each record's labels
fn fold_results(
    tree: &mut RecordTree,
    record: NodeId,
    results: &HashMap<NodeId, ProcessResult>,
) -> ProcessResult {
    let mut folded = results.get(&record).cloned().unwrap_or_default();
    for nested in tree.nested_records(record) {
        let child = fold_results(tree, nested, results);
        folded.merge(&child);
    }
    apply_security_labels(tree, record, &folded);
    folded
}

/// Removes nodes left with neither a value nor children, record roots excepted
fn prune_empty(tree: &mut RecordTree) {
    let mut order = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        order.push(id);
        stack.extend(tree.children(id).iter().copied());
    }
    // reversed pre-order visits every child before its parent
    for id in order.into_iter().rev() {
        if tree.is_record_root(id) {
            continue;
        }
        if tree.value(id).is_none() && tree.children(id).is_empty() {
            tree.detach(id);
        }
    }
}

fn dicom_text(tree: &RecordTree, keyword: &str) -> Option<String> {
    if tree.format() != RecordFormat::Dicom {
        return None;
    }
    tree.child_named(tree.root(), keyword)
        .and_then(|id| tree.value(id))
        .map(Scalar::to_text)
}

/// Identity of the top-level record, used for audit
fn record_identity(tree: &RecordTree) -> Option<String> {
    match tree.format() {
        RecordFormat::Fhir => tree
            .child_named(tree.root(), "id")
            .and_then(|id| tree.value(id))
            .map(Scalar::to_text),
        RecordFormat::Dicom => {
            dicom_text(tree, "SOPInstanceUID").or_else(|| dicom_text(tree, "PatientID"))
        }
    }
}
