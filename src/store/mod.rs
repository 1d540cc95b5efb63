//! Job store adapter: per-species input and output artifacts as named blobs
//! in a remote store, with retrying copy/list/remove operations.

pub mod local;
pub mod retry;
pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub use local::LocalStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use s3::S3Store;

/// Blob get/put/remove/list keyed by artifact name. Implementations are
/// consumed through [`RetryingStore`], which owns the transient-failure
/// retry policy.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch a blob to a local file, creating parent directories.
    async fn get(&self, key: &str, dest: &Path) -> Result<()>;

    /// Upload a local file to a blob.
    async fn put(&self, src: &Path, key: &str) -> Result<()>;

    /// List blob keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every blob under a prefix. Removing an absent prefix is not an
    /// error.
    async fn remove_prefix(&self, prefix: &str) -> Result<()>;
}
