#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use stratum::error::{Result, StratumError};
use stratum::providers::{CompletionResponse, Message, Provider, ToolCall};
use stratum::storage::{LocalObjectStore, SqliteTableStore, TableStore};
use stratum::tools::{ToolRegistry, ToolRegistryBuilder};

/// Provider replaying scripted responses; errors once the script runs out
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<VecDeque<Result<Message>>>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<Message>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversations received, one per call
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, messages: &[Message], _tools: &[Value]) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(message)) => Ok(CompletionResponse::new(message)),
            Some(Err(e)) => Err(e),
            None => Err(StratumError::Provider("script exhausted".to_string()).into()),
        }
    }

    fn model_name(&self) -> String {
        "scripted".to_string()
    }
}

/// Assistant message requesting a single tool call
pub fn tool_turn(id: &str, name: &str, arguments: Value) -> Message {
    Message::assistant_with_tools(vec![ToolCall::new(id, name, arguments)])
}

/// Object store directory, warehouse and audit file in one temp dir
pub struct PipelineFixture {
    pub dir: TempDir,
    pub tables: Arc<SqliteTableStore>,
    pub registry: ToolRegistry,
}

impl PipelineFixture {
    /// Creates a `demos` bucket holding `files`
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("failed to create tempdir");
        let bucket = dir.path().join("buckets").join("demos");
        fs::create_dir_all(&bucket).expect("failed to create bucket");
        for (key, contents) in files {
            fs::write(bucket.join(key), contents).expect("failed to write object");
        }

        let tables = Arc::new(
            SqliteTableStore::new(dir.path().join("warehouse.db"))
                .expect("failed to create warehouse"),
        );
        let registry = ToolRegistryBuilder::new(
            Arc::new(LocalObjectStore::new(dir.path().join("buckets"))),
            Arc::clone(&tables) as Arc<dyn TableStore>,
            "demos",
        )
        .build()
        .expect("failed to build registry");

        Self {
            dir,
            tables,
            registry,
        }
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.path().join("logs").join("audit.jsonl")
    }
}

pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("stratum.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
