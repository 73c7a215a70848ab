//! Test utilities for Stratum
//!
//! This module provides scripted providers, recording observers and small
//! filesystem helpers shared by unit tests.

use crate::agent::{AuditSink, RunEvent, RunObserver, RunRecord};
use crate::config::Config;
use crate::error::{Result, StratumError};
use crate::providers::{CompletionResponse, Message, Provider};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Panics
///
/// Panics if the directory cannot be created
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content, creating parent directories
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T: std::fmt::Debug>(result: Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!("Expected error containing '{}' but got Ok({:?})", expected, value),
        Err(e) => {
            let error_msg = format!("{:#}", e);
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Configuration pointing every store at `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.object_store.backend = crate::config::ObjectStoreBackend::Local;
    config.storage.object_store.local_root = dir.path().join("buckets");
    config.storage.warehouse.path = dir.path().join("warehouse.db");
    config.audit.path = dir.path().join("audit.jsonl");
    config.logging.file_path = None;
    config
}

/// Provider that replays a fixed list of responses
///
/// Fails once the script is exhausted. Clones share the script and the
/// call counter.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Message>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    /// Creates a provider answering with `responses` in order
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[Value]) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| StratumError::Provider("script lock poisoned".to_string()))?
            .pop_front();
        match next {
            Some(message) => Ok(CompletionResponse::new(message)),
            None => Err(StratumError::Provider("script exhausted".to_string()).into()),
        }
    }

    fn model_name(&self) -> String {
        "scripted".to_string()
    }
}

/// Observer that records event names
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Event names in delivery order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RunObserver for RecordingObserver {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, _run_id: &str, event: &RunEvent<'_>) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.name().to_string());
        }
        Ok(())
    }
}

/// Audit sink that always fails
pub struct FailingAuditSink;

impl AuditSink for FailingAuditSink {
    fn record(&self, _record: &RunRecord) -> Result<()> {
        Err(StratumError::Audit("disk full".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_file_nested() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "demos/orders.csv", "id\n1\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "id\n1\n");
    }

    #[test]
    fn test_assert_error_contains() {
        let result: Result<()> = Err(StratumError::Config("bad level".into()).into());
        assert_error_contains(result, "bad level");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_is_valid() {
        let dir = temp_dir();
        let config = test_config(&dir);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_scripted_provider_replays_then_fails() {
        let provider = ScriptedProvider::new(vec![Message::assistant("one")]);
        let first = provider.complete(&[], &[]).await.unwrap();
        assert_eq!(first.message.content, "one");
        assert!(provider.complete(&[], &[]).await.is_err());
        assert_eq!(provider.calls(), 2);
    }
}
