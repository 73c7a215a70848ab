//! Configuration management for Stratum
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, StratumError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Stratum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Model provider configuration
    pub provider: ProviderConfig,
    /// Agent behavior configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Object store and warehouse configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Provider configuration
///
/// Specifies which model provider to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama (must support tool calling)
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// HTTP timeout for a single completion request (seconds)
    #[serde(default = "default_ollama_timeout")]
    pub timeout_seconds: u64,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3-groq-tool-use".to_string()
}

fn default_ollama_timeout() -> u64 {
    120
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            temperature: 0.0,
            timeout_seconds: default_ollama_timeout(),
        }
    }
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of model turns before a run is aborted
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Optional file whose contents replace the built-in operating instructions
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,

    /// Tool execution settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_max_steps() -> usize {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            system_prompt_path: None,
            tools: ToolsConfig::default(),
        }
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Maximum size of tool output handed back to the model (bytes)
    #[serde(default = "default_max_output")]
    pub max_output_size: usize,
}

fn default_max_output() -> usize {
    65_536
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_output_size: default_max_output(),
        }
    }
}

/// Storage configuration for the object store and the warehouse
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store holding the source CSV files
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// Relational warehouse the agent loads tables into
    #[serde(default)]
    pub warehouse: WarehouseConfig,
}

/// Object store backend selector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreBackend {
    /// S3-compatible HTTP endpoint
    #[default]
    S3,
    /// Local directory, one sub-directory per bucket
    Local,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Which backend to use
    #[serde(default)]
    pub backend: ObjectStoreBackend,

    /// Default bucket for tools that omit one
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// S3 endpoint URL (path-style addressing)
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,

    /// S3 signing region
    #[serde(default = "default_s3_region")]
    pub region: String,

    /// Access key; requests are sent unsigned when absent
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Secret key paired with `access_key_id`
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Root directory for the local backend
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// HTTP timeout for object store requests (seconds)
    #[serde(default = "default_object_store_timeout")]
    pub timeout_seconds: u64,
}

fn default_bucket() -> String {
    "demos".to_string()
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data/buckets")
}

fn default_object_store_timeout() -> u64 {
    30
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::default(),
            bucket: default_bucket(),
            endpoint: default_s3_endpoint(),
            region: default_s3_region(),
            access_key_id: None,
            secret_access_key: None,
            local_root: default_local_root(),
            timeout_seconds: default_object_store_timeout(),
        }
    }
}

/// Warehouse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_warehouse_path")]
    pub path: PathBuf,
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("data/warehouse.db")
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON Lines file receiving one record per run
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,

    /// Replace tool-message contents with a size marker before persisting
    #[serde(default)]
    pub redact_tool_output: bool,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("logs/audit.jsonl")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            redact_tool_output: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that mirrors stdout logging (append mode)
    #[serde(default = "default_log_file")]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "stratum=info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/agent_run.log"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: default_log_file(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter (requires the `prometheus` feature)
    #[serde(default)]
    pub prometheus: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            provider: ProviderConfig {
                provider_type: "ollama".to_string(),
                ollama: OllamaConfig::default(),
            },
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StratumError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| StratumError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("STRATUM_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(host) = std::env::var("STRATUM_OLLAMA_HOST") {
            self.provider.ollama.host = host;
        }

        if let Ok(model) = std::env::var("STRATUM_OLLAMA_MODEL") {
            self.provider.ollama.model = model;
        }

        if let Ok(max_steps) = std::env::var("STRATUM_MAX_STEPS") {
            if let Ok(value) = max_steps.parse() {
                self.agent.max_steps = value;
            } else {
                tracing::warn!("Invalid STRATUM_MAX_STEPS: {}", max_steps);
            }
        }

        let store = &mut self.storage.object_store;

        if let Ok(backend) = std::env::var("STRATUM_OBJECT_STORE_BACKEND") {
            store.backend = match backend.to_lowercase().as_str() {
                "s3" => ObjectStoreBackend::S3,
                "local" => ObjectStoreBackend::Local,
                _ => {
                    tracing::warn!("Invalid object store backend: {}, using default", backend);
                    ObjectStoreBackend::default()
                }
            };
        }

        if let Ok(bucket) = std::env::var("STRATUM_S3_BUCKET") {
            store.bucket = bucket;
        }

        if let Ok(endpoint) = std::env::var("STRATUM_S3_ENDPOINT") {
            store.endpoint = endpoint;
        }

        if let Ok(region) = std::env::var("STRATUM_S3_REGION") {
            store.region = region;
        }

        if let Ok(key) = std::env::var("STRATUM_S3_ACCESS_KEY_ID") {
            store.access_key_id = Some(key);
        }

        if let Ok(secret) = std::env::var("STRATUM_S3_SECRET_ACCESS_KEY") {
            store.secret_access_key = Some(secret);
        }

        if let Ok(root) = std::env::var("STRATUM_LOCAL_ROOT") {
            store.local_root = PathBuf::from(root);
        }

        if let Ok(path) = std::env::var("STRATUM_WAREHOUSE_PATH") {
            self.storage.warehouse.path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("STRATUM_AUDIT_PATH") {
            self.audit.path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("STRATUM_LOG_FILE") {
            self.logging.file_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "stratum=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type.is_empty() {
            return Err(StratumError::Config("Provider type cannot be empty".to_string()).into());
        }

        let valid_providers = ["ollama"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(StratumError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.agent.max_steps == 0 {
            return Err(
                StratumError::Config("max_steps must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.max_steps > 1000 {
            return Err(StratumError::Config(
                "max_steps must be less than or equal to 1000".to_string(),
            )
            .into());
        }

        if self.agent.tools.max_output_size == 0 {
            return Err(StratumError::Config(
                "tools.max_output_size must be greater than 0".to_string(),
            )
            .into());
        }

        let store = &self.storage.object_store;
        if store.bucket.is_empty() {
            return Err(StratumError::Config(
                "storage.object_store.bucket cannot be empty".to_string(),
            )
            .into());
        }

        if store.backend == ObjectStoreBackend::S3 {
            url::Url::parse(&store.endpoint).map_err(|e| {
                StratumError::Config(format!(
                    "storage.object_store.endpoint is not a valid URL: {}",
                    e
                ))
            })?;

            if store.access_key_id.is_some() != store.secret_access_key.is_some() {
                return Err(StratumError::Config(
                    "access_key_id and secret_access_key must be set together".to_string(),
                )
                .into());
            }
        }

        if !(0.0..=2.0).contains(&self.provider.ollama.temperature) {
            return Err(StratumError::Config(
                "provider.ollama.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.provider_type, "ollama");
        assert_eq!(config.agent.max_steps, 25);
        assert_eq!(config.storage.object_store.bucket, "demos");
        assert!(!config.audit.redact_tool_output);
    }

    #[test]
    fn test_config_validation_success() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_provider() {
        let mut config = Config::default();
        config.provider.provider_type = "openai".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_max_steps() {
        let mut config = Config::default();
        config.agent.max_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_max_steps_too_large() {
        let mut config = Config::default();
        config.agent.max_steps = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_half_configured_credentials() {
        let mut config = Config::default();
        config.storage.object_store.access_key_id = Some("minio".to_string());
        assert!(config.validate().is_err());

        config.storage.object_store.secret_access_key = Some("minio123".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_endpoint() {
        let mut config = Config::default();
        config.storage.object_store.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        config.storage.object_store.backend = ObjectStoreBackend::Local;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
provider:
  type: ollama
  ollama:
    host: http://gpu-box:11434
    model: qwen2.5:14b
    temperature: 0.2

agent:
  max_steps: 40
  tools:
    max_output_size: 4096

storage:
  object_store:
    backend: local
    bucket: landing
    local_root: /srv/buckets
  warehouse:
    path: /srv/warehouse.db

audit:
  path: /var/log/stratum/audit.jsonl
  redact_tool_output: true

logging:
  level: debug
  json_format: true
  file_path: null
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.ollama.host, "http://gpu-box:11434");
        assert_eq!(config.agent.max_steps, 40);
        assert_eq!(config.agent.tools.max_output_size, 4096);
        assert_eq!(config.storage.object_store.backend, ObjectStoreBackend::Local);
        assert_eq!(config.storage.object_store.bucket, "landing");
        assert_eq!(
            config.storage.warehouse.path,
            PathBuf::from("/srv/warehouse.db")
        );
        assert!(config.audit.redact_tool_output);
        assert!(config.logging.json_format);
        assert!(config.logging.file_path.is_none());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("provider:\n  type: ollama\n").unwrap();
        assert_eq!(config.agent.max_steps, 25);
        assert_eq!(config.storage.object_store.region, "us-east-1");
        assert_eq!(
            config.logging.file_path,
            Some(PathBuf::from("logs/agent_run.log"))
        );
    }

    #[test]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = crate::cli::Cli::default();
        let config = Config::load("/definitely/not/here.yaml", &cli).unwrap();
        assert_eq!(config.provider.provider_type, "ollama");
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_storage() {
        std::env::set_var("STRATUM_S3_BUCKET", "raw-zone");
        std::env::set_var("STRATUM_OBJECT_STORE_BACKEND", "local");
        std::env::set_var("STRATUM_MAX_STEPS", "7");
        std::env::set_var("STRATUM_WAREHOUSE_PATH", "/tmp/wh.db");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("STRATUM_S3_BUCKET");
        std::env::remove_var("STRATUM_OBJECT_STORE_BACKEND");
        std::env::remove_var("STRATUM_MAX_STEPS");
        std::env::remove_var("STRATUM_WAREHOUSE_PATH");

        assert_eq!(config.storage.object_store.bucket, "raw-zone");
        assert_eq!(
            config.storage.object_store.backend,
            ObjectStoreBackend::Local
        );
        assert_eq!(config.agent.max_steps, 7);
        assert_eq!(config.storage.warehouse.path, PathBuf::from("/tmp/wh.db"));
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_ignores_invalid_max_steps() {
        std::env::set_var("STRATUM_MAX_STEPS", "many");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("STRATUM_MAX_STEPS");
        assert_eq!(config.agent.max_steps, 25);
    }

    #[test]
    fn test_verbose_cli_raises_log_level() {
        let cli = crate::cli::Cli {
            verbose: true,
            ..Default::default()
        };
        let mut config = Config::default();
        config.apply_cli_overrides(&cli);
        assert_eq!(config.logging.level, "stratum=debug");
    }
}
