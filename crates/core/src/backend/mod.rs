pub mod local;
pub mod s3;

use crate::config::{BackendKind, StorageConfig};
use crate::error::StorageResult;
use crate::types::ObjectDescriptor;
use anyhow::Result;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

pub use local::LocalBackend;
pub use s3::S3Backend;

/// Object storage abstraction, one method per backend call.
///
/// Implementations are shared read-only across concurrent tool calls.
#[async_trait::async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Names of every bucket visible to the configured credential
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;

    /// Objects in `bucket` whose key starts with `prefix`, from a single listing call
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectDescriptor>>;

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Store `body` at `key`, replacing any existing object
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StorageResult<()>;

    async fn upload_file(&self, bucket: &str, local_path: &Path, key: &str) -> StorageResult<()>;

    /// Write the object at `key` to `local_path`, replacing any existing file
    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()>;

    /// Remove `key`; succeeds when the key is already absent
    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

/// Build the backend selected by the configuration.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectBackend>> {
    let backend: Arc<dyn ObjectBackend> = match config.backend {
        BackendKind::S3 => Arc::new(S3Backend::new(&config.s3).await),
        BackendKind::Local => Arc::new(LocalBackend::new(config.local.root.clone())?),
    };
    Ok(backend)
}
