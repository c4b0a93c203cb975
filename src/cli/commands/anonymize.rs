//! Anonymize command implementation
//!
//! This module implements the `anonymize` command, which streams an NDJSON
//! file of FHIR resources or DICOM JSON datasets through the partitioned
//! pipeline and writes the de-identified records to an output file.

use crate::adapters::ndjson::{NdjsonSink, NdjsonSource};
use crate::anonymization::AnonymizationEngine;
use crate::config::load_config;
use crate::core::pipeline::{spawn_progress_reporter, PartitionedExecutor, PipelineOptions};
use crate::domain::{RecordFormat, Result};
use anyhow::Context;
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the anonymize command
#[derive(Args, Debug)]
pub struct AnonymizeArgs {
    /// Input NDJSON file, one record per line
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output NDJSON file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Override record format (fhir or dicom)
    #[arg(long)]
    pub format: Option<RecordFormat>,

    /// Override records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override maximum batches in flight
    #[arg(long)]
    pub partitions: Option<usize>,

    /// Write batches as they finish instead of in input order
    #[arg(long)]
    pub unordered: bool,
}

impl AnonymizeArgs {
    /// Execute the anonymize command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Starting anonymize command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        // Apply CLI overrides
        if let Some(format) = self.format {
            config.processing.format = format;
        }
        if let Some(batch_size) = self.batch_size {
            config.processing.batch_size = batch_size;
        }
        if let Some(partitions) = self.partitions {
            config.processing.partition_count = partitions;
        }
        if self.unordered {
            config.processing.keep_order = false;
        }

        let options = PipelineOptions::from(&config.processing);
        if let Err(e) = options.validate() {
            eprintln!("Configuration error: {e}");
            return Ok(2);
        }

        let engine = match AnonymizationEngine::new(&config.anonymization) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                tracing::error!(error = %e, "Failed to build anonymization engine");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        let mut source = NdjsonSource::open(&self.input)
            .await
            .with_context(|| format!("Failed to open input {}", self.input.display()))?;
        let mut sink = NdjsonSink::create(&self.output)
            .await
            .with_context(|| format!("Failed to create output {}", self.output.display()))?;

        let format = config.processing.format;
        let (executor, progress) = PartitionedExecutor::new(options).with_progress();
        let executor = executor.with_shutdown(shutdown_signal);
        let reporter = spawn_progress_reporter(progress);

        println!("🚀 Anonymizing {} ({format})...", self.input.display());

        let outcome = executor
            .run(&mut source, &mut sink, move |line: String| {
                let engine = Arc::clone(&engine);
                async move { anonymize_line(&engine, &line, format).await.map(Some) }
            })
            .await;
        let _ = reporter.await;

        let summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(error = %e, "Anonymization failed");
                eprintln!("Anonymization failed: {e}");
                return Ok(5);
            }
        };
        summary.log_summary();

        println!();
        println!("📊 Anonymization Summary:");
        println!("  Records Read: {}", summary.total_read);
        println!("  Anonymized: {}", summary.completed);
        println!("  Failed: {}", summary.failed);
        println!("  Batches: {}", summary.batches);
        println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
        println!("  Success Rate: {:.2}%", summary.success_rate());
        println!("  Output: {}", self.output.display());

        if !summary.errors.is_empty() {
            println!();
            println!("  ⚠️  Failures:");
            for error in summary.errors.iter().take(10) {
                println!("    - {error}");
            }
            if summary.errors.len() > 10 {
                println!("    ... and {} more failures", summary.errors.len() - 10);
            }
        }
        println!();

        if summary.interrupted {
            println!("⚠️  Run interrupted; output contains the batches finished before shutdown");
            return Ok(130);
        }
        if summary.failed > 0 {
            return Ok(1);
        }
        Ok(0)
    }
}

/// Parses, anonymizes and re-serializes one NDJSON line
pub async fn anonymize_line(
    engine: &AnonymizationEngine,
    line: &str,
    format: RecordFormat,
) -> Result<String> {
    let value: Value = serde_json::from_str(line)?;
    let anonymized = engine.anonymize_json(value, format).await?;
    Ok(serde_json::to_string(&anonymized)?)
}
