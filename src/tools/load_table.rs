//! load_table tool for copying a CSV object into the warehouse
//!
//! The target table is dropped and recreated inside a single transaction, so
//! readers see either the previous contents or the new ones, never a mix.

use crate::error::Result;
use crate::storage::{ObjectStore, TableStore};
use crate::tools::{
    optional_str, required_str, run_blocking, ParamType, ParameterSpec, ToolDescriptor,
    ToolExecutor, ToolResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Tool name as seen by the model
pub const NAME: &str = "load_table";

/// Loads a CSV object into a warehouse table, replacing any previous table
pub struct LoadTableTool {
    objects: Arc<dyn ObjectStore>,
    tables: Arc<dyn TableStore>,
    default_bucket: String,
}

impl LoadTableTool {
    /// Create a new load tool
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        tables: Arc<dyn TableStore>,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            tables,
            default_bucket: default_bucket.into(),
        }
    }

    /// Descriptor registered for this tool
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "Load a CSV object from the object store into a warehouse table. \
             Any existing table with the same name is replaced atomically. \
             Column types (INTEGER, REAL, TEXT) are inferred from the data. \
             Returns the name of the loaded table.",
            vec![
                ParameterSpec::required("key", ParamType::String, "Object key of the CSV file"),
                ParameterSpec::required(
                    "table",
                    ParamType::String,
                    "Name of the table to create, e.g. bronze_orders",
                ),
                ParameterSpec::optional(
                    "bucket",
                    ParamType::String,
                    "Bucket holding the object (defaults to the configured bucket)",
                ),
            ],
        )
    }
}

#[async_trait]
impl ToolExecutor for LoadTableTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let key = required_str(&args, NAME, "key")?;
        let table = required_str(&args, NAME, "table")?.to_string();
        let bucket = optional_str(&args, "bucket").unwrap_or(&self.default_bucket);

        let data = self.objects.get(bucket, key).await?;
        tracing::debug!(bucket = %bucket, key = %key, bytes = data.len(), "Fetched CSV object");

        let tables = Arc::clone(&self.tables);
        let target = table.clone();
        let summary = run_blocking(NAME, move || tables.replace_from_csv(&target, &data)).await?;

        tracing::info!(
            "Loaded {}/{} into {} ({} rows, {} columns)",
            bucket,
            key,
            summary.table,
            summary.rows,
            summary.columns.len()
        );

        Ok(ToolResult::success(summary.table.clone())
            .with_metadata("source", format!("{}/{}", bucket, key))
            .with_metadata("rows", summary.rows)
            .with_metadata("columns", summary.columns.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StratumError;
    use crate::storage::{LocalObjectStore, SqliteTableStore};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        tables: Arc<SqliteTableStore>,
        tool: LoadTableTool,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().join("buckets/demos");
        std::fs::create_dir_all(&bucket).unwrap();
        std::fs::write(bucket.join("orders.csv"), "id,total\n1,9.5\n2,3\n").unwrap();
        std::fs::write(bucket.join("broken.csv"), "id,total\n1\n").unwrap();

        let objects = Arc::new(LocalObjectStore::new(dir.path().join("buckets")));
        let tables = Arc::new(SqliteTableStore::new(dir.path().join("wh.db")).unwrap());
        let tool = LoadTableTool::new(objects, tables.clone(), "demos");
        Fixture {
            _dir: dir,
            tables,
            tool,
        }
    }

    #[tokio::test]
    async fn test_load_table_returns_table_name() {
        let f = fixture();
        let result = f
            .tool
            .execute(json!({"key": "orders.csv", "table": "bronze_orders"}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "bronze_orders");
        assert_eq!(result.metadata.get("rows"), Some(&"2".to_string()));
        assert_eq!(result.metadata.get("columns"), Some(&"2".to_string()));
        assert_eq!(f.tables.list_tables().unwrap(), vec!["bronze_orders"]);
    }

    #[tokio::test]
    async fn test_load_malformed_csv_is_statement_error() {
        let f = fixture();
        let err = f
            .tool
            .execute(json!({"key": "broken.csv", "table": "bronze_broken"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StratumError>(),
            Some(StratumError::Statement(_))
        ));
        assert!(f.tables.list_tables().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_object() {
        let f = fixture();
        let err = f
            .tool
            .execute(json!({"key": "nope.csv", "table": "t"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("object not found"));
    }
}
