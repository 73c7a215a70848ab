//! Error types for Stratum
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Stratum operations
///
/// Variants fall into three groups that the agent loop treats differently:
///
/// - registry-level errors (`DuplicateTool`, `UnknownTool`, `InvalidArguments`)
///   raised by the tool registry at registration or dispatch time
/// - tool-level errors (`ToolExecution`, `Statement`, `UnknownTable`,
///   `ObjectStore`) which are always turned into tool messages for the model
/// - `AgentExecution`, which is fatal to a run
#[derive(Error, Debug)]
pub enum StratumError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-related errors (API calls, malformed responses, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// The model call failed and the run was aborted
    #[error(
        "Agent execution failed (run {run_id}): {message}{}",
        audit_note(.audit_error)
    )]
    AgentExecution {
        /// Identifier of the aborted run
        run_id: String,
        /// Description of the underlying failure
        message: String,
        /// Set when the run could not be written to the audit trail either
        audit_error: Option<String>,
    },

    /// The agent loop received an input its current state does not accept
    #[error("Invalid loop transition from {state} on {input}")]
    InvalidTransition {
        /// State the loop was in
        state: &'static str,
        /// Input that was rejected
        input: &'static str,
    },

    /// A message would break the conversation invariants
    #[error("Conversation invariant violated: {0}")]
    Conversation(String),

    /// A tool with the same name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// No tool with the requested name is registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed schema validation
    #[error("Invalid arguments for tool '{tool}': {}", fields.join("; "))]
    InvalidArguments {
        /// Tool whose schema rejected the arguments
        tool: String,
        /// One entry per offending field
        fields: Vec<String>,
    },

    /// A tool implementation failed
    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecution {
        /// Tool that failed
        tool: String,
        /// Failure description
        message: String,
    },

    /// A warehouse statement could not be executed
    #[error("Statement error: {0}")]
    Statement(String),

    /// The referenced warehouse table does not exist
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Object store listing or retrieval failed
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Audit trail could not be written or read
    #[error("Audit error: {0}")]
    Audit(String),

    /// Warehouse storage errors outside of statement execution
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StratumError {
    /// Returns true for errors raised by the tool registry itself rather than
    /// by a tool implementation
    pub fn is_registry_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTool(_) | Self::UnknownTool(_) | Self::InvalidArguments { .. }
        )
    }
}

/// Result type alias for Stratum operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Domain errors
/// are carried as `StratumError` and can be recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn audit_note(audit_error: &Option<String>) -> String {
    match audit_error {
        Some(e) => format!(" (audit write failed: {})", e),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = StratumError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_agent_execution_error_display() {
        let error = StratumError::AgentExecution {
            run_id: "run-1".to_string(),
            message: "connection refused".to_string(),
            audit_error: None,
        };
        assert_eq!(
            error.to_string(),
            "Agent execution failed (run run-1): connection refused"
        );
    }

    #[test]
    fn test_agent_execution_error_display_with_audit_failure() {
        let error = StratumError::AgentExecution {
            run_id: "run-1".to_string(),
            message: "connection refused".to_string(),
            audit_error: Some("disk full".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Agent execution failed (run run-1): connection refused (audit write failed: disk full)"
        );
    }

    #[test]
    fn test_invalid_arguments_lists_every_field() {
        let error = StratumError::InvalidArguments {
            tool: "load_table".to_string(),
            fields: vec![
                "key: missing required field".to_string(),
                "extra: unknown field".to_string(),
            ],
        };
        let s = error.to_string();
        assert!(s.contains("load_table"));
        assert!(s.contains("key: missing required field"));
        assert!(s.contains("extra: unknown field"));
    }

    #[test]
    fn test_unknown_tool_error_display() {
        let error = StratumError::UnknownTool("drop_everything".to_string());
        assert_eq!(error.to_string(), "Unknown tool: drop_everything");
    }

    #[test]
    fn test_tool_execution_error_display() {
        let error = StratumError::ToolExecution {
            tool: "load_table".to_string(),
            message: "Statement error: near \"FROM\": syntax error".to_string(),
        };
        assert!(error.to_string().starts_with("Tool 'load_table' execution failed"));
    }

    #[test]
    fn test_registry_error_classification() {
        assert!(StratumError::UnknownTool("x".into()).is_registry_error());
        assert!(StratumError::DuplicateTool("x".into()).is_registry_error());
        assert!(StratumError::InvalidArguments {
            tool: "x".into(),
            fields: vec![]
        }
        .is_registry_error());
        assert!(!StratumError::Statement("bad".into()).is_registry_error());
        assert!(!StratumError::UnknownTable("t".into()).is_registry_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: StratumError = io_error.into();
        assert!(matches!(error, StratumError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: StratumError = json_error.into();
        assert!(matches!(error, StratumError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: StratumError = yaml_error.into();
        assert!(matches!(error, StratumError::Yaml(_)));
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let result: Result<()> = Err(StratumError::UnknownTable("bronze_orders".into()).into());
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StratumError>(),
            Some(StratumError::UnknownTable(name)) if name == "bronze_orders"
        ));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StratumError>();
    }
}
