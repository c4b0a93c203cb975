//! Audit logger for anonymization operations

use crate::anonymization::context::OperationKind;
use crate::anonymization::engine::AnonymizedRecord;
use crate::domain::{Result, VeilError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Audit log entry
#[derive(Debug, Serialize)]
struct AuditLogEntry {
    timestamp: String,
    /// SHA-256 of the record id (never the plaintext id)
    record_id_hash: Option<String>,
    record_type: Option<String>,
    format: String,
    operations: BTreeMap<OperationKind, u64>,
    total_changes: u64,
    processing_time_ms: u64,
}

/// Appends one line per anonymized record
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
    json_format: bool,
    enabled: bool,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(log_path: PathBuf, json_format: bool, enabled: bool) -> Result<Self> {
        if enabled {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    VeilError::Io(format!(
                        "Failed to create audit log directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        Ok(Self {
            log_path,
            json_format,
            enabled,
        })
    }

    /// Log one anonymized record
    pub fn log_record(&self, record: &AnonymizedRecord) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = AuditLogEntry {
            timestamp: record.timestamp.to_rfc3339(),
            record_id_hash: record.record_id.as_deref().map(hash_identifier),
            record_type: record.record_type.clone(),
            format: record.tree.format().to_string(),
            operations: record.result.counts().clone(),
            total_changes: record.result.total(),
            processing_time_ms: record.processing_time_ms,
        };

        self.write_entry(&entry)
    }

    fn write_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        let line = if self.json_format {
            serde_json::to_string(entry)?
        } else {
            let operations = entry
                .operations
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect::<Vec<_>>()
                .join(",");
            format!(
                "[{}] Record: {} | Type: {} | Operations: {} | Time: {}ms",
                entry.timestamp,
                entry.record_id_hash.as_deref().unwrap_or("-"),
                entry.record_type.as_deref().unwrap_or("-"),
                operations,
                entry.processing_time_ms
            )
        };

        // one write per line keeps concurrent workers from interleaving
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                VeilError::Io(format!(
                    "Failed to open audit log {}: {e}",
                    self.log_path.display()
                ))
            })?;
        file.write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }
}

/// Hash a record identifier using SHA-256
fn hash_identifier(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    format!("{result:x}")
}
