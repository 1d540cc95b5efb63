//! Filesystem-backed blob store, used for local runs and tests.

use crate::error::{PanforgeError, Result};
use crate::store::BlobStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(key)).await?)
    }

    async fn get(&self, key: &str, dest: &Path) -> Result<()> {
        let src = self.blob_path(key);
        if !tokio::fs::try_exists(&src).await? {
            return Err(PanforgeError::Store(format!("no such blob: {key}")));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await?;
        Ok(())
    }

    async fn put(&self, src: &Path, key: &str) -> Result<()> {
        let dest = self.blob_path(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(src, &dest).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.blob_path(prefix);
        if !tokio::fs::try_exists(&base).await? {
            return Ok(Vec::new());
        }
        if tokio::fs::metadata(&base).await?.is_file() {
            return Ok(vec![prefix.to_string()]);
        }

        let mut keys = Vec::new();
        let mut pending = vec![base];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    let rel = path.strip_prefix(&self.root).map_err(|_| {
                        PanforgeError::Store(format!("blob outside store root: {}", path.display()))
                    })?;
                    keys.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        let base = self.blob_path(prefix);
        if !tokio::fs::try_exists(&base).await? {
            return Ok(());
        }
        if tokio::fs::metadata(&base).await?.is_dir() {
            tokio::fs::remove_dir_all(&base).await?;
        } else {
            tokio::fs::remove_file(&base).await?;
        }
        Ok(())
    }
}
