//! Storage backends for Stratum
//!
//! Two stores sit behind the tool catalog: a read-only object store holding
//! the source CSV files and the relational warehouse the agent writes into.

pub mod object_store;
pub mod s3;
pub mod warehouse;

pub use object_store::{LocalObjectStore, ObjectStore};
pub use s3::S3ObjectStore;
pub use warehouse::{
    ColumnInfo, LoadSummary, SqliteTableStore, StatementOutput, TablePreview, TableStore,
};

use crate::config::{ObjectStoreBackend, ObjectStoreConfig};
use crate::error::Result;
use std::sync::Arc;

/// Create the configured object store backend
///
/// # Errors
///
/// Returns error if the S3 endpoint is invalid or the HTTP client cannot be built
///
/// # Examples
///
/// ```
/// use stratum::config::{ObjectStoreBackend, ObjectStoreConfig};
/// use stratum::storage::create_object_store;
///
/// let config = ObjectStoreConfig {
///     backend: ObjectStoreBackend::Local,
///     ..ObjectStoreConfig::default()
/// };
/// let store = create_object_store(&config).unwrap();
/// assert_eq!(store.backend_name(), "local");
/// ```
pub fn create_object_store(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        ObjectStoreBackend::S3 => Ok(Arc::new(S3ObjectStore::new(config)?)),
        ObjectStoreBackend::Local => Ok(Arc::new(LocalObjectStore::new(&config.local_root))),
    }
}
