//! Line-delimited JSON file source and sink
//!
//! The source yields raw lines (blank lines skipped) so that parsing happens
//! inside the per-item function, where a malformed record counts as an item
//! failure instead of aborting the run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

use crate::core::pipeline::{Sink, Source};
use crate::domain::{Result, VeilError};

/// Reads one record per line
pub struct NdjsonSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: u64,
}

impl NdjsonSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| VeilError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }

    /// Lines read so far, blank ones included
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

#[async_trait]
impl Source for NdjsonSource {
    type Item = String;

    async fn next(&mut self) -> Result<Option<String>> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                VeilError::Io(format!(
                    "Failed to read {} at line {}: {}",
                    self.path.display(),
                    self.line_number + 1,
                    e
                ))
            })?;
            match line {
                Some(line) => {
                    self.line_number += 1;
                    if !line.trim().is_empty() {
                        return Ok(Some(line));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}

/// Writes one record per line
pub struct NdjsonSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl NdjsonSink {
    /// Creates (or truncates) the output file, creating parent directories
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| VeilError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

#[async_trait]
impl Sink for NdjsonSink {
    type Item = String;

    async fn consume(&mut self, batch: Vec<String>) -> Result<()> {
        for line in batch {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.written += 1;
        }
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.writer.flush().await?;
        tracing::debug!(path = %self.path.display(), records = self.written, "Output flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_source_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.ndjson");
        std::fs::write(&path, "{\"a\":1}\n\n   \n{\"a\":2}\n").unwrap();

        let mut source = NdjsonSource::open(&path).await.unwrap();
        assert_eq!(source.next().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(source.next().await.unwrap().as_deref(), Some("{\"a\":2}"));
        assert_eq!(source.next().await.unwrap(), None);
        assert_eq!(source.line_number(), 4);
    }

    #[tokio::test]
    async fn test_sink_writes_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.ndjson");

        let mut sink = NdjsonSink::create(&path).await.unwrap();
        sink.consume(vec!["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        sink.consume(vec!["three".to_string()]).await.unwrap();
        sink.complete().await.unwrap();

        assert_eq!(sink.written(), 3);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_missing_input_is_io_error() {
        let result = NdjsonSource::open("/definitely/not/here.ndjson").await;
        assert!(matches!(result, Err(VeilError::Io(_))));
    }
}
