//! describe_table tool for inspecting a warehouse table's schema

use crate::error::Result;
use crate::storage::TableStore;
use crate::tools::{
    required_str, run_blocking, ParamType, ParameterSpec, ToolDescriptor, ToolExecutor,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tool name as seen by the model
pub const NAME: &str = "describe_table";

/// Describes the columns of a table
pub struct DescribeTableTool {
    tables: Arc<dyn TableStore>,
}

impl DescribeTableTool {
    /// Create a new describe tool
    pub fn new(tables: Arc<dyn TableStore>) -> Self {
        Self { tables }
    }

    /// Descriptor registered for this tool
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "Describe the columns of a warehouse table. Returns a JSON array of \
             {name, type} objects, or plain column names when include_types is false.",
            vec![
                ParameterSpec::required("table", ParamType::String, "Table to describe"),
                ParameterSpec::optional(
                    "include_types",
                    ParamType::Boolean,
                    "Include column types (default true)",
                ),
            ],
        )
    }
}

#[async_trait]
impl ToolExecutor for DescribeTableTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let table = required_str(&args, NAME, "table")?.to_string();
        let include_types = args
            .get("include_types")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let tables = Arc::clone(&self.tables);
        let lookup = table.clone();
        let columns = run_blocking(NAME, move || tables.describe(&lookup)).await?;

        let rendered: Vec<Value> = columns
            .iter()
            .map(|c| {
                if include_types {
                    json!({"name": c.name, "type": c.data_type})
                } else {
                    json!(c.name)
                }
            })
            .collect();

        Ok(ToolResult::success(Value::Array(rendered).to_string())
            .with_metadata("table", table)
            .with_metadata("columns", columns.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StratumError;
    use crate::storage::SqliteTableStore;
    use tempfile::TempDir;

    fn tool() -> (TempDir, DescribeTableTool) {
        let dir = TempDir::new().unwrap();
        let store = SqliteTableStore::new(dir.path().join("wh.db")).unwrap();
        store
            .replace_from_csv("bronze_customers", b"id,name\n1,ann\n")
            .unwrap();
        (dir, DescribeTableTool::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_describe_with_types() {
        let (_dir, tool) = tool();
        let result = tool
            .execute(json!({"table": "bronze_customers"}))
            .await
            .unwrap();
        assert_eq!(
            result.output,
            r#"[{"name":"id","type":"INTEGER"},{"name":"name","type":"TEXT"}]"#
        );
    }

    #[tokio::test]
    async fn test_describe_without_types() {
        let (_dir, tool) = tool();
        let result = tool
            .execute(json!({"table": "bronze_customers", "include_types": false}))
            .await
            .unwrap();
        assert_eq!(result.output, r#"["id","name"]"#);
    }

    #[tokio::test]
    async fn test_describe_unknown_table() {
        let (_dir, tool) = tool();
        let err = tool.execute(json!({"table": "ghost"})).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StratumError>(),
            Some(StratumError::UnknownTable(name)) if name == "ghost"
        ));
    }
}
