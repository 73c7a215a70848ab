//! execute_statement tool for running SQL against the warehouse

use crate::error::Result;
use crate::storage::{StatementOutput, TableStore};
use crate::tools::{
    required_str, run_blocking, ParamType, ParameterSpec, ToolDescriptor, ToolExecutor,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Tool name as seen by the model
pub const NAME: &str = "execute_statement";

/// Runs a statement or a batch of statements
///
/// Queries return `{"columns": [...], "rows": [[...]]}` for the last
/// row-producing statement; everything else returns the affected row count.
pub struct ExecuteStatementTool {
    tables: Arc<dyn TableStore>,
}

impl ExecuteStatementTool {
    /// Create a new statement tool
    pub fn new(tables: Arc<dyn TableStore>) -> Self {
        Self { tables }
    }

    /// Descriptor registered for this tool
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "Execute SQL against the warehouse (SQLite dialect). Accepts a single \
             statement or several separated by semicolons. Returns the result set \
             of the last query as JSON, or the number of affected rows.",
            vec![ParameterSpec::required(
                "sql",
                ParamType::String,
                "SQL to execute",
            )],
        )
    }
}

#[async_trait]
impl ToolExecutor for ExecuteStatementTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let sql = required_str(&args, NAME, "sql")?.to_string();
        tracing::debug!("Executing statement: {}", sql);

        let tables = Arc::clone(&self.tables);
        let output = run_blocking(NAME, move || tables.execute(&sql)).await?;

        let result = ToolResult::success(output.to_json_string());
        Ok(match output {
            StatementOutput::Rows { rows, .. } => result.with_metadata("rows", rows.len()),
            StatementOutput::Affected(count) => result.with_metadata("rows_affected", count),
        })
    }
}
