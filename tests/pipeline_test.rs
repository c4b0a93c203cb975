//! Integration tests for the partitioned pipeline driving the anonymization engine
//!
//! These tests verify that:
//! - Output order follows input order when `keep_order` is set
//! - Malformed records are counted and excluded, never passed through
//! - A failing record aborts the run when failures are not skipped
//! - A shutdown signal stops admission and marks the run interrupted

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::watch;
use veil::adapters::ndjson::{NdjsonSink, NdjsonSource};
use veil::anonymization::config::{AnonymizationConfig, RuleDescriptor};
use veil::anonymization::AnonymizationEngine;
use veil::cli::commands::anonymize::anonymize_line;
use veil::core::pipeline::{spawn_progress_reporter, PartitionedExecutor, PipelineOptions};
use veil::domain::RecordFormat;

fn engine() -> Arc<AnonymizationEngine> {
    let config = AnonymizationConfig {
        rules: vec![
            RuleDescriptor::new("Patient.name", "redact"),
            RuleDescriptor::new("Patient.birthDate", "dateshift"),
        ],
        ..Default::default()
    };
    Arc::new(AnonymizationEngine::new(&config).unwrap())
}

fn patient(i: usize) -> String {
    json!({
        "resourceType": "Patient",
        "id": format!("p{i}"),
        "name": [{"family": format!("Family{i}"), "given": ["Alex"]}],
        "birthDate": "1980-06-15"
    })
    .to_string()
}

/// Writes `count` patients, inserting a malformed line after `malformed_after` when given
fn write_input(dir: &TempDir, count: usize, malformed_after: Option<usize>) -> std::path::PathBuf {
    let mut lines = Vec::new();
    for i in 0..count {
        lines.push(patient(i));
        if malformed_after == Some(i) {
            lines.push("{\"resourceType\": \"Patient\", ".to_string());
        }
        if i % 7 == 0 {
            lines.push(String::new());
        }
    }
    let path = dir.path().join("input.ndjson");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn read_output(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn options(keep_order: bool, skip_failed_item: bool) -> PipelineOptions {
    PipelineOptions {
        batch_size: 4,
        partition_count: 3,
        keep_order,
        skip_failed_item,
    }
}

async fn run_pipeline(
    dir: &TempDir,
    input: &std::path::Path,
    options: PipelineOptions,
    shutdown: Option<watch::Receiver<bool>>,
) -> veil::domain::Result<veil::core::pipeline::PipelineSummary> {
    let mut source = NdjsonSource::open(input).await?;
    let mut sink = NdjsonSink::create(dir.path().join("output.ndjson")).await?;
    let mut executor = PartitionedExecutor::new(options);
    if let Some(shutdown) = shutdown {
        executor = executor.with_shutdown(shutdown);
    }

    let engine = engine();
    executor
        .run(&mut source, &mut sink, move |line: String| {
            let engine = Arc::clone(&engine);
            async move {
                anonymize_line(&engine, &line, RecordFormat::Fhir)
                    .await
                    .map(Some)
            }
        })
        .await
}

#[tokio::test]
async fn test_ordered_run_skips_malformed_record() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, 25, Some(10));

    let summary = run_pipeline(&dir, &input, options(true, true), None)
        .await
        .unwrap();

    assert_eq!(summary.total_read, 26);
    assert_eq!(summary.completed, 25);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(!summary.interrupted);
    assert!(!summary.is_successful());

    let records = read_output(&dir.path().join("output.ndjson"));
    let ids: Vec<String> = records
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..25).map(|i| format!("p{i}")).collect();
    assert_eq!(ids, expected);

    for record in &records {
        assert!(record.get("name").is_none());
        assert_ne!(record["birthDate"], "1980-06-15");
    }
}

#[tokio::test]
async fn test_unordered_run_delivers_every_record() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, 30, None);

    let summary = run_pipeline(&dir, &input, options(false, true), None)
        .await
        .unwrap();
    assert_eq!(summary.completed, 30);
    assert!(summary.is_successful());

    let mut ids: Vec<String> = read_output(&dir.path().join("output.ndjson"))
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    let mut expected: Vec<String> = (0..30).map(|i| format!("p{i}")).collect();
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_failure_aborts_when_not_skipping() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, 12, Some(5));

    let result = run_pipeline(&dir, &input, options(true, false), None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_shutdown_signal_interrupts_run() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, 40, None);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let summary = run_pipeline(&dir, &input, options(true, true), Some(shutdown_rx))
        .await
        .unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.completed, 0);
    assert!(read_output(&dir.path().join("output.ndjson")).is_empty());
}

#[tokio::test]
async fn test_progress_reporter_sees_final_totals() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir, 10, None);

    let mut source = NdjsonSource::open(&input).await.unwrap();
    let mut sink = NdjsonSink::create(dir.path().join("output.ndjson")).await.unwrap();
    let (executor, progress) = PartitionedExecutor::new(options(true, true)).with_progress();
    let reporter = spawn_progress_reporter(progress);

    let engine = engine();
    let summary = executor
        .run(&mut source, &mut sink, move |line: String| {
            let engine = Arc::clone(&engine);
            async move {
                anonymize_line(&engine, &line, RecordFormat::Fhir)
                    .await
                    .map(Some)
            }
        })
        .await
        .unwrap();

    let totals = reporter.await.unwrap();
    assert_eq!(totals.completed, summary.completed);
    assert_eq!(totals.read, 10);
    assert_eq!(totals.batches, 3);
}
