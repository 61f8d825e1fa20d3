//! Directory-backed object store.
//!
//! Each bucket is a subdirectory of `root`; object keys are `/`-separated paths
//! relative to the bucket. Subdirectories are listed as container markers
//! (`photos/`), the way folder placeholders show up in hosted stores.

use crate::{ObjectDescriptor, ObjectStore, StoreError};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::task;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || !is_relative_normal(Path::new(bucket)) {
            return Err(StoreError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalStore {
    async fn list(&self, bucket: &str) -> Result<Vec<ObjectDescriptor>, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        if !tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }

        let objects = task::spawn_blocking(move || walk_bucket(&dir))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        debug!(bucket, count = objects.len(), "Listed local bucket");
        Ok(objects)
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let relative = Path::new(key);
        if key.is_empty() || key.ends_with('/') || !is_relative_normal(relative) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let path = self.bucket_dir(bucket)?.join(relative);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn walk_bucket(dir: &Path) -> Result<Vec<ObjectDescriptor>, StoreError> {
    let mut objects = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let mut key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let size = if entry.file_type().is_dir() {
            key.push('/');
            0
        } else {
            entry.metadata().map(|m| m.len()).unwrap_or_default()
        };
        objects.push(ObjectDescriptor { key, size });
    }
    Ok(objects)
}

fn is_relative_normal(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}
