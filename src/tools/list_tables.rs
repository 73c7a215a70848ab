//! list_tables tool for enumerating warehouse tables

use crate::error::Result;
use crate::storage::TableStore;
use crate::tools::{run_blocking, ToolDescriptor, ToolExecutor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Tool name as seen by the model
pub const NAME: &str = "list_tables";

/// Lists all user tables in the warehouse
pub struct ListTablesTool {
    tables: Arc<dyn TableStore>,
}

impl ListTablesTool {
    /// Create a new list tool
    pub fn new(tables: Arc<dyn TableStore>) -> Self {
        Self { tables }
    }

    /// Descriptor registered for this tool
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "List the names of all tables currently in the warehouse as a JSON array.",
            vec![],
        )
    }
}

#[async_trait]
impl ToolExecutor for ListTablesTool {
    async fn execute(&self, _args: Value) -> Result<ToolResult> {
        let tables = Arc::clone(&self.tables);
        let names = run_blocking(NAME, move || tables.list_tables()).await?;
        Ok(ToolResult::success(serde_json::to_string(&names)?).with_metadata("count", names.len()))
    }
}
