//! Tool registry builder
//!
//! Assembles the fixed tool catalog from the configured object store and
//! warehouse. The catalog is built once at startup and never changes.

use std::sync::Arc;

use crate::config::{Config, ToolsConfig};
use crate::error::Result;
use crate::storage::{create_object_store, ObjectStore, SqliteTableStore, TableStore};
use crate::tools::{
    DescribeTableTool, ExecuteStatementTool, ListObjectsTool, ListTablesTool, LoadTableTool,
    ToolRegistry,
};

/// Builder for the data pipeline tool registry
///
/// # Examples
///
/// ```
/// use stratum::storage::{LocalObjectStore, SqliteTableStore};
/// use stratum::tools::registry_builder::ToolRegistryBuilder;
/// use std::sync::Arc;
///
/// let dir = tempfile::tempdir().unwrap();
/// let registry = ToolRegistryBuilder::new(
///     Arc::new(LocalObjectStore::new(dir.path())),
///     Arc::new(SqliteTableStore::new(dir.path().join("wh.db")).unwrap()),
///     "demos",
/// )
/// .build()
/// .unwrap();
/// assert_eq!(registry.len(), 5);
/// ```
pub struct ToolRegistryBuilder {
    objects: Arc<dyn ObjectStore>,
    tables: Arc<dyn TableStore>,
    default_bucket: String,
    tools_config: ToolsConfig,
}

impl ToolRegistryBuilder {
    /// Create a new builder over the given stores
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        tables: Arc<dyn TableStore>,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            tables,
            default_bucket: default_bucket.into(),
            tools_config: ToolsConfig::default(),
        }
    }

    /// Create a builder from application configuration
    ///
    /// # Errors
    ///
    /// Returns error if the object store or warehouse cannot be initialized
    pub fn from_config(config: &Config) -> Result<Self> {
        let objects = create_object_store(&config.storage.object_store)?;
        let tables: Arc<dyn TableStore> =
            Arc::new(SqliteTableStore::new(&config.storage.warehouse.path)?);
        Ok(
            Self::new(objects, tables, config.storage.object_store.bucket.clone())
                .with_tools_config(config.agent.tools.clone()),
        )
    }

    /// Set the tools configuration
    pub fn with_tools_config(mut self, config: ToolsConfig) -> Self {
        self.tools_config = config;
        self
    }

    /// Build the registry
    ///
    /// # Errors
    ///
    /// Returns `StratumError::DuplicateTool` if two tools share a name
    pub fn build(&self) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::with_max_output_size(self.tools_config.max_output_size);

        registry.register(
            ListObjectsTool::descriptor(),
            Arc::new(ListObjectsTool::new(
                Arc::clone(&self.objects),
                self.default_bucket.clone(),
            )),
        )?;
        registry.register(
            LoadTableTool::descriptor(),
            Arc::new(LoadTableTool::new(
                Arc::clone(&self.objects),
                Arc::clone(&self.tables),
                self.default_bucket.clone(),
            )),
        )?;
        registry.register(
            ExecuteStatementTool::descriptor(),
            Arc::new(ExecuteStatementTool::new(Arc::clone(&self.tables))),
        )?;
        registry.register(
            DescribeTableTool::descriptor(),
            Arc::new(DescribeTableTool::new(Arc::clone(&self.tables))),
        )?;
        registry.register(
            ListTablesTool::descriptor(),
            Arc::new(ListTablesTool::new(Arc::clone(&self.tables))),
        )?;

        tracing::debug!("Built tool registry with {} tools", registry.len());
        Ok(registry)
    }
}
