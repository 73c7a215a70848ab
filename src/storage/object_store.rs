//! Object store abstraction and local directory backend

use crate::error::{Result, StratumError};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Read-only view of a bucketed object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns every object key in `bucket`, sorted ascending
    ///
    /// # Errors
    ///
    /// Returns `StratumError::ObjectStore` if the bucket does not exist or
    /// cannot be listed
    async fn list(&self, bucket: &str) -> Result<Vec<String>>;

    /// Returns the full contents of one object
    ///
    /// # Errors
    ///
    /// Returns `StratumError::ObjectStore` if the object is missing or
    /// cannot be read
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Short backend label used in logs
    fn backend_name(&self) -> &'static str;
}

/// Object store over a local directory
///
/// Each immediate sub-directory of the root is a bucket and keys are
/// `/`-separated paths relative to that sub-directory.
///
/// # Examples
///
/// ```
/// use stratum::storage::{LocalObjectStore, ObjectStore};
///
/// # tokio_test::block_on(async {
/// let root = tempfile::tempdir().unwrap();
/// std::fs::create_dir_all(root.path().join("demos")).unwrap();
/// std::fs::write(root.path().join("demos/orders.csv"), "id\n1\n").unwrap();
///
/// let store = LocalObjectStore::new(root.path());
/// assert_eq!(store.list("demos").await.unwrap(), vec!["orders.csv"]);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(StratumError::ObjectStore(format!("invalid bucket name: {}", bucket)).into());
        }

        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(StratumError::ObjectStore(format!("bucket not found: {}", bucket)).into());
        }
        Ok(dir)
    }

    fn list_blocking(&self, bucket: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                StratumError::ObjectStore(format!("failed to list bucket {}: {}", bucket, e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|e| StratumError::ObjectStore(e.to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }

        keys.sort();
        Ok(keys)
    }

    fn get_blocking(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let dir = self.bucket_dir(bucket)?;

        let relative = Path::new(key);
        if key.is_empty() || !is_plain_relative(relative) {
            return Err(StratumError::ObjectStore(format!("invalid object key: {}", key)).into());
        }

        let path = dir.join(relative);
        if !path.is_file() {
            return Err(StratumError::ObjectStore(format!(
                "object not found: {}/{}",
                bucket, key
            ))
            .into());
        }

        std::fs::read(&path).map_err(|e| {
            StratumError::ObjectStore(format!("failed to read {}/{}: {}", bucket, key, e)).into()
        })
    }
}

/// True when the path only has normal components (no root, no `..`)
fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let store = self.clone();
        let bucket = bucket.to_string();
        tokio::task::spawn_blocking(move || store.list_blocking(&bucket))
            .await
            .map_err(|e| StratumError::ObjectStore(format!("listing task failed: {}", e)))?
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let store = self.clone();
        let bucket = bucket.to_string();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.get_blocking(&bucket, &key))
            .await
            .map_err(|e| StratumError::ObjectStore(format!("read task failed: {}", e)))?
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
