//! Durable run records
//!
//! Every finished run, done or aborted, produces one [`RunRecord`]. The
//! JSON Lines sink appends each record as a single line under an exclusive
//! advisory lock so concurrent runs never interleave or overwrite.

use crate::agent::state::{AbortReason, RunStatus};
use crate::config::AuditConfig;
use crate::error::{Result, StratumError};
use crate::providers::{Message, Role};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Persisted summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier (UUID v4)
    pub run_id: String,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
    /// Goal given by the caller
    pub goal: String,
    /// Terminal status
    pub status: RunStatus,
    /// Final answer when the run is done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    /// Model turns taken
    pub steps: usize,
    /// Why the run stopped early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<AbortReason>,
    /// Full conversation in order
    pub messages: Vec<Message>,
}

impl RunRecord {
    /// Number of tool messages in the transcript
    pub fn tool_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::Tool).count()
    }
}

/// Destination for run records
pub trait AuditSink: Send + Sync {
    /// Persists one record
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Audit` if the record could not be stored
    fn record(&self, record: &RunRecord) -> Result<()>;
}

/// Append-only JSON Lines audit file
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
    redact_tool_output: bool,
}

impl JsonlAuditSink {
    /// Creates a sink writing to `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            redact_tool_output: false,
        }
    }

    /// Builds a sink from the audit configuration
    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.path).with_redaction(config.redact_tool_output)
    }

    /// Replace tool-message contents with a size marker before writing
    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact_tool_output = redact;
        self
    }

    /// Path of the audit file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn audit_err(&self, action: &str, e: impl std::fmt::Display) -> StratumError {
        StratumError::Audit(format!(
            "failed to {} {}: {}",
            action,
            self.path.display(),
            e
        ))
    }

    fn redact(record: &RunRecord) -> RunRecord {
        let mut redacted = record.clone();
        for message in redacted.messages.iter_mut().filter(|m| m.role == Role::Tool) {
            message.content = format!("[redacted {} bytes]", message.content.len());
        }
        redacted
    }

    /// Reads every record in file order
    ///
    /// A missing file yields no records. Lines that do not parse are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Audit` if the file exists but cannot be read
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.audit_err("open", e).into()),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.audit_err("read", e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping malformed audit line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Finds a record by full run id or unique id prefix
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Audit` when the prefix matches several runs
    pub fn find(&self, id_or_prefix: &str) -> Result<Option<RunRecord>> {
        let records = self.read_all()?;
        if let Some(exact) = records.iter().find(|r| r.run_id == id_or_prefix) {
            return Ok(Some(exact.clone()));
        }

        let mut matches = records
            .into_iter()
            .filter(|r| r.run_id.starts_with(id_or_prefix));
        let first = matches.next();
        if matches.next().is_some() {
            return Err(StratumError::Audit(format!(
                "run id prefix '{}' matches more than one run",
                id_or_prefix
            ))
            .into());
        }
        Ok(first)
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: &RunRecord) -> Result<()> {
        let mut line = if self.redact_tool_output {
            serde_json::to_string(&Self::redact(record))?
        } else {
            serde_json::to_string(record)?
        };
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.audit_err("create directory for", e))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.audit_err("open", e))?;

        FileExt::lock_exclusive(&file).map_err(|e| self.audit_err("lock", e))?;
        let written = file
            .write_all(line.as_bytes())
            .and_then(|_| file.flush());
        let unlocked = FileExt::unlock(&file);
        written.map_err(|e| self.audit_err("write", e))?;
        unlocked.map_err(|e| self.audit_err("unlock", e))?;

        tracing::debug!(run_id = %record.run_id, "Audit record written to {}", self.path.display());
        Ok(())
    }
}
