//! Local directory object store

use crate::error::{DbError, DbResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Object store that keeps uploads as files under a bucket directory
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, destination: &str) -> DbResult<PathBuf> {
        let relative = Path::new(destination);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if destination.is_empty() || escapes {
            return Err(DbError::ObjectStoreError {
                destination: destination.to_string(),
                message: "destination must be a relative path inside the bucket".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, local: &Path, destination: &str) -> DbResult<String> {
        let target = self.resolve(destination)?;
        let store_error = |e: std::io::Error| DbError::ObjectStoreError {
            destination: destination.to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(store_error)?;
        }
        tokio::fs::copy(local, &target).await.map_err(store_error)?;
        log::debug!("Uploaded {} to {}", local.display(), target.display());
        Ok(target.display().to_string())
    }
}
