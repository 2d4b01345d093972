use super::ObjectBackend;
use crate::error::{StorageError, StorageResult};
use crate::types::ObjectDescriptor;
use anyhow::{Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::{Path, PathBuf};

/// Filesystem-backed buckets (for local development and tests)
///
/// Every directory directly under `root` is a bucket; objects are files
/// beneath it, keyed by their relative path.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root).context("Failed to create local bucket root")?;
        tracing::info!(root = %root.display(), "Local bucket root ready");
        Ok(Self { root })
    }

    fn bucket_store(&self, bucket: &str) -> StorageResult<LocalFileSystem> {
        if bucket.is_empty()
            || bucket == "."
            || bucket == ".."
            || bucket.contains(['/', '\\'])
        {
            return Err(StorageError::InvalidBucket(bucket.to_string()));
        }

        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(StorageError::backend(
                "OpenBucket",
                format!("The specified bucket does not exist: {}", bucket),
            ));
        }

        Ok(LocalFileSystem::new_with_prefix(dir)?)
    }
}

fn object_path(key: &str) -> StorageResult<ObjectPath> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    ObjectPath::parse(key).map_err(|e| StorageError::InvalidKey(format!("{}: {}", key, e)))
}

/// Deepest whole path segment of `prefix`, used to narrow the directory walk.
/// `reports/2024-` scopes to `reports`; `rep` scopes to the bucket root.
fn listing_scope(prefix: &str) -> Option<ObjectPath> {
    prefix
        .rfind('/')
        .map(|idx| ObjectPath::from(&prefix[..idx]))
        .filter(|path| !path.as_ref().is_empty())
}

#[async_trait::async_trait]
impl ObjectBackend for LocalBackend {
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let mut buckets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                buckets.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        buckets.sort();
        Ok(buckets)
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectDescriptor>> {
        let store = self.bucket_store(bucket)?;
        let scope = listing_scope(prefix);

        let metas: Vec<_> = store.list(scope.as_ref()).try_collect().await?;

        let mut files: Vec<ObjectDescriptor> = metas
            .into_iter()
            .filter(|meta| meta.location.as_ref().starts_with(prefix))
            .map(|meta| ObjectDescriptor {
                key: meta.location.to_string(),
                size: meta.size as u64,
                last_modified: meta.last_modified,
            })
            .collect();

        // S3 lists in UTF-8 binary order; the directory walk does not
        files.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(files)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let store = self.bucket_store(bucket)?;
        let path = object_path(key)?;
        let result = store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StorageResult<()> {
        let store = self.bucket_store(bucket)?;
        let path = object_path(key)?;
        store.put(&path, body.into()).await?;
        Ok(())
    }

    async fn upload_file(&self, bucket: &str, local_path: &Path, key: &str) -> StorageResult<()> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::io(local_path, e))?;
        self.put_object(bucket, key, Bytes::from(data)).await
    }

    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        let data = self.get_object(bucket, key).await?;
        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| StorageError::io(local_path, e))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let store = self.bucket_store(bucket)?;
        let path = object_path(key)?;
        match store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
