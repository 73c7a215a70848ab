//! list_objects tool for enumerating a bucket

use crate::error::Result;
use crate::storage::ObjectStore;
use crate::tools::{optional_str, ParamType, ParameterSpec, ToolDescriptor, ToolExecutor, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Tool name as seen by the model
pub const NAME: &str = "list_objects";

/// Lists object keys in a bucket, sorted by key
///
/// # Examples
///
/// ```
/// use stratum::storage::LocalObjectStore;
/// use stratum::tools::{ListObjectsTool, ToolExecutor};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// std::fs::create_dir_all(root.path().join("demos")).unwrap();
/// let tool = ListObjectsTool::new(Arc::new(LocalObjectStore::new(root.path())), "demos");
/// let result = tool.execute(json!({})).await.unwrap();
/// assert_eq!(result.output, "[]");
/// # });
/// ```
pub struct ListObjectsTool {
    store: Arc<dyn ObjectStore>,
    default_bucket: String,
}

impl ListObjectsTool {
    /// Create a tool listing `default_bucket` unless the call names another
    pub fn new(store: Arc<dyn ObjectStore>, default_bucket: impl Into<String>) -> Self {
        Self {
            store,
            default_bucket: default_bucket.into(),
        }
    }

    /// Descriptor registered for this tool
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "List the keys of all objects in an object-store bucket, sorted by key. \
             Returns a JSON array of keys. Uses the default bucket when none is given.",
            vec![ParameterSpec::optional(
                "bucket",
                ParamType::String,
                "Bucket to list (defaults to the configured bucket)",
            )],
        )
    }
}

#[async_trait]
impl ToolExecutor for ListObjectsTool {
    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let bucket = optional_str(&args, "bucket").unwrap_or(&self.default_bucket);

        let keys = self.store.list(bucket).await?;
        tracing::debug!(
            backend = self.store.backend_name(),
            bucket = %bucket,
            count = keys.len(),
            "Listed objects"
        );

        Ok(ToolResult::success(serde_json::to_string(&keys)?)
            .with_metadata("bucket", bucket)
            .with_metadata("count", keys.len()))
    }
}
