use super::ObjectBackend;
use crate::config::S3Settings;
use crate::error::{StorageError, StorageResult};
use crate::types::ObjectDescriptor;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::Path;

/// S3 (or S3-compatible) backend over the official AWS SDK
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// Build the client once from settings.
    ///
    /// Explicit keys are used only when both halves are configured; otherwise
    /// the SDK default provider chain applies. Missing credentials are not an
    /// error here, they surface on the first call.
    pub async fn new(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "pail-config",
            ));
        }

        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::info!(
            region = %settings.region,
            endpoint = settings.endpoint_url.as_deref().unwrap_or("default"),
            "S3 client configured"
        );

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn sdk_error(operation: &'static str, err: impl std::error::Error) -> StorageError {
    StorageError::backend(operation, DisplayErrorContext(err).to_string())
}

fn to_chrono(ts: &AwsDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()).unwrap_or_default()
}

/// Listing entry for `object`; entries without a key are skipped.
///
/// S3 always sends `LastModified`, but compatible services may not. A missing
/// timestamp is logged and reported as the Unix epoch.
fn descriptor(bucket: &str, object: &Object) -> Option<ObjectDescriptor> {
    let key = object.key()?;
    let last_modified = match object.last_modified() {
        Some(ts) => to_chrono(ts),
        None => {
            tracing::debug!(bucket, key, "Listing entry has no LastModified, reporting epoch");
            DateTime::<Utc>::default()
        }
    };

    Some(ObjectDescriptor {
        key: key.to_string(),
        size: object.size().unwrap_or(0).max(0) as u64,
        last_modified,
    })
}

#[async_trait::async_trait]
impl ObjectBackend for S3Backend {
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| sdk_error("ListBuckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectDescriptor>> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", e))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| descriptor(bucket, object))
            .collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("GetObject", e))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| sdk_error("GetObject", e))?;
        Ok(body.into_bytes())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("PutObject", e))?;
        Ok(())
    }

    async fn upload_file(&self, bucket: &str, local_path: &Path, key: &str) -> StorageResult<()> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::io(local_path, e))?;
        self.put_object(bucket, key, Bytes::from(data)).await
    }

    async fn download_file(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        // Fetch before touching the target so a failed GET leaves it intact
        let data = self.get_object(bucket, key).await?;
        tokio::fs::write(local_path, &data)
            .await
            .map_err(|e| StorageError::io(local_path, e))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObject", e))?;
        Ok(())
    }
}
