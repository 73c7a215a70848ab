//! Loading a configuration file and building the agent from it

mod common;

use common::temp_config_file;
use serial_test::serial;

use stratum::cli::Cli;
use stratum::commands::run::build_agent;
use stratum::config::{Config, ObjectStoreBackend};

fn yaml(root: &std::path::Path) -> String {
    format!(
        r#"
provider:
  type: ollama
  ollama:
    host: http://localhost:11434
    model: qwen2.5:7b
    temperature: 0.1

agent:
  max_steps: 12
  tools:
    max_output_size: 4096

storage:
  object_store:
    backend: local
    bucket: landing
    local_root: {root}/buckets
  warehouse:
    path: {root}/warehouse.db

audit:
  path: {root}/audit.jsonl
  redact_tool_output: true

logging:
  level: stratum=warn
  file_path: null
"#,
        root = root.display()
    )
}

#[test]
#[serial]
fn test_load_file_and_build_agent() {
    std::env::remove_var("STRATUM_MAX_STEPS");
    let scratch = tempfile::TempDir::new().unwrap();
    let (_dir, path) = temp_config_file(&yaml(scratch.path()));

    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.agent.max_steps, 12);
    assert_eq!(config.storage.object_store.backend, ObjectStoreBackend::Local);
    assert_eq!(config.storage.object_store.bucket, "landing");
    assert!(config.audit.redact_tool_output);
    assert!(config.logging.file_path.is_none());

    let agent = build_agent(&config).unwrap();
    assert_eq!(agent.tools().len(), 5);
    assert!(agent.system_prompt().contains("\"landing\""));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let scratch = tempfile::TempDir::new().unwrap();
    let (_dir, path) = temp_config_file(&yaml(scratch.path()));

    std::env::set_var("STRATUM_MAX_STEPS", "3");
    let config = Config::load(path.to_str().unwrap(), &Cli::default());
    std::env::remove_var("STRATUM_MAX_STEPS");

    assert_eq!(config.unwrap().agent.max_steps, 3);
}

#[test]
#[serial]
fn test_invalid_yaml_is_config_error() {
    let (_dir, path) = temp_config_file("agent: [not, a, map");
    let err = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}
