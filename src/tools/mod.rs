//! Tools module for Stratum
//!
//! This module contains tool descriptors, the tool registry, and the tool
//! implementations the model uses to move data from the object store into
//! the warehouse.

pub mod describe_table;
pub mod execute_statement;
pub mod list_objects;
pub mod list_tables;
pub mod load_table;
pub mod registry_builder;
pub mod validation;

pub use describe_table::DescribeTableTool;
pub use execute_statement::ExecuteStatementTool;
pub use list_objects::ListObjectsTool;
pub use list_tables::ListTablesTool;
pub use load_table::LoadTableTool;
pub use registry_builder::ToolRegistryBuilder;

use crate::error::{panic_message, Result, StratumError};
use crate::providers::Message;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// JSON type accepted for a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string
    String,
    /// JSON number without a fractional part
    Integer,
    /// Any JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl ParamType {
    /// Returns true when `value` has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(s)
    }
}

/// One named argument of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Argument name
    pub name: String,
    /// Expected JSON type
    pub kind: ParamType,
    /// Whether the argument must be present
    pub required: bool,
    /// Description shown to the model
    pub description: String,
}

impl ParameterSpec {
    /// A required parameter
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        }
    }

    /// An optional parameter
    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Name, parameter schema and behavioral description of a tool
///
/// # Examples
///
/// ```
/// use stratum::tools::{ParamType, ParameterSpec, ToolDescriptor};
///
/// let descriptor = ToolDescriptor::new(
///     "describe_table",
///     "Show the columns of a table",
///     vec![ParameterSpec::required("table", ParamType::String, "Table name")],
/// );
/// let schema = descriptor.to_json_schema();
/// assert_eq!(schema["type"], "object");
/// assert_eq!(schema["required"][0], "table");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,
    /// What the tool does, as explained to the model
    pub description: String,
    /// Accepted arguments in declaration order
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    /// Create a new descriptor
    pub fn new(name: &str, description: &str, parameters: Vec<ParameterSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// Looks up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Renders the parameters as a JSON Schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.to_string(),
                    "description": param.description,
                }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Renders the descriptor in the function calling format sent to the model
    pub fn to_definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.to_json_schema(),
        })
    }
}

/// Tool result structure
///
/// Represents the result of a tool execution with metadata
/// and truncation support.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Whether the tool execution succeeded
    pub success: bool,
    /// Output from the tool
    pub output: String,
    /// Error message if execution failed
    pub error: Option<String>,
    /// Whether the output was truncated
    pub truncated: bool,
    /// Additional metadata about the execution
    pub metadata: BTreeMap<String, String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            truncated: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a failed tool result
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            truncated: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Add metadata to the result
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Truncate output if it exceeds the maximum size
    ///
    /// The cut lands on a character boundary at or below `max_size` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::tools::ToolResult;
    ///
    /// let result = ToolResult::success("ééé").truncate_if_needed(3);
    /// assert!(result.truncated);
    /// assert_eq!(result.output, "é");
    /// ```
    pub fn truncate_if_needed(mut self, max_size: usize) -> Self {
        if self.output.len() > max_size {
            let mut cut = max_size;
            while !self.output.is_char_boundary(cut) {
                cut -= 1;
            }
            self.output.truncate(cut);
            self.truncated = true;
        }
        self
    }

    /// Convert to the content of a tool message
    pub fn to_message(&self) -> String {
        if self.success {
            if self.truncated {
                format!("{}\n... (output truncated)", self.output)
            } else {
                self.output.clone()
            }
        } else {
            format!(
                "Error: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Outcome of one tool call, correlated with the call that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    /// Id of the originating tool call
    pub tool_call_id: String,
    /// Tool output or captured failure
    pub result: ToolResult,
}

impl ToolInvocationResult {
    /// Wraps the result into the tool message appended to the conversation
    pub fn to_message(&self) -> Message {
        Message::tool_result(self.tool_call_id.clone(), self.result.to_message())
    }
}

/// Tool executor trait for implementing tool execution logic
///
/// Implementations receive arguments that already passed schema validation.
///
/// # Examples
///
/// ```no_run
/// use stratum::tools::{ToolExecutor, ToolResult};
/// use stratum::error::Result;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct PingTool;
///
/// #[async_trait]
/// impl ToolExecutor for PingTool {
///     async fn execute(&self, _args: Value) -> Result<ToolResult> {
///         Ok(ToolResult::success("pong"))
///     }
/// }
/// ```
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes the tool with the given arguments
    ///
    /// # Errors
    ///
    /// Returns error if execution fails; the registry turns it into a failed
    /// `ToolResult`
    async fn execute(&self, args: Value) -> Result<ToolResult>;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    executor: Arc<dyn ToolExecutor>,
}

/// Tool registry for managing available tools
///
/// Tools are registered once at startup. The registry validates arguments
/// against each descriptor before calling the implementation and captures
/// implementation failures as failed results.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    max_output_size: usize,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::with_max_output_size(crate::config::ToolsConfig::default().max_output_size)
    }

    /// Create an empty registry that truncates outputs at `max_output_size` bytes
    pub fn with_max_output_size(max_output_size: usize) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            max_output_size,
        }
    }

    /// Register a tool
    ///
    /// # Errors
    ///
    /// Returns `StratumError::DuplicateTool` if the name is already taken
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(StratumError::DuplicateTool(descriptor.name).into());
        }
        tracing::debug!("Registered tool {}", descriptor.name);
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            executor,
        });
        Ok(())
    }

    /// Looks up a descriptor by name
    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i].descriptor)
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor)
    }

    /// Tool definitions rendered for the model, in registration order
    pub fn definitions(&self) -> Vec<Value> {
        self.descriptors().map(ToolDescriptor::to_definition).collect()
    }

    /// Validate arguments and run a tool
    ///
    /// # Errors
    ///
    /// Returns `StratumError::UnknownTool` if no tool has this name and
    /// `StratumError::InvalidArguments` if the arguments do not match the
    /// schema. Failures inside the tool, including panics, are returned as a
    /// failed `ToolResult` instead.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Result<ToolResult> {
        let entry = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| StratumError::UnknownTool(name.to_string()))?;

        validation::validate_arguments(&entry.descriptor, arguments).map_err(|fields| {
            StratumError::InvalidArguments {
                tool: name.to_string(),
                fields,
            }
        })?;

        let outcome = AssertUnwindSafe(entry.executor.execute(arguments.clone()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::error(
                StratumError::ToolExecution {
                    tool: name.to_string(),
                    message: e.to_string(),
                }
                .to_string(),
            ),
            Err(payload) => ToolResult::error(
                StratumError::ToolExecution {
                    tool: name.to_string(),
                    message: format!("tool panicked: {}", panic_message(payload.as_ref())),
                }
                .to_string(),
            ),
        };

        Ok(result.truncate_if_needed(self.max_output_size))
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs blocking store work on the blocking pool
///
/// A panic in `work` is reported as a `ToolExecution` error for `tool`.
pub(crate) async fn run_blocking<T, F>(tool: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        StratumError::ToolExecution {
            tool: tool.to_string(),
            message: format!("blocking task failed: {}", e),
        }
    })?
}

/// Reads an optional string argument, treating null as absent
pub(crate) fn optional_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// Reads a string argument the schema marks as required
pub(crate) fn required_str<'a>(args: &'a Value, tool: &str, name: &str) -> Result<&'a str> {
    optional_str(args, name).ok_or_else(|| {
        StratumError::InvalidArguments {
            tool: tool.to_string(),
            fields: vec![format!("{}: missing required field", name)],
        }
        .into()
    })
}
