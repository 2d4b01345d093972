//! Storage operations and their uniform result envelope.
//!
//! Each operation issues exactly one backend call and never fails outward:
//! backend errors and panics alike are caught at the operation boundary and
//! become [`OperationResult::Failure`].

use crate::backend::ObjectBackend;
use crate::error::StorageResult;
use crate::types::BucketListing;
use bytes::Bytes;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

/// Message for an empty bucket name, checked before any backend call
pub const BUCKET_NOT_SET: &str = "bucket name not set";

/// Names of every operation, in registration order
pub const OPERATION_NAMES: [&str; 7] = [
    "list_buckets",
    "list_bucket",
    "get_object",
    "put_object",
    "upload_local_file",
    "download_file_to_local",
    "delete_object",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBucketsParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBucketParams {
    pub bucket_name: String,
    #[serde(default)]
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetObjectParams {
    pub bucket_name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectParams {
    pub bucket_name: String,
    pub key: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLocalFileParams {
    pub bucket_name: String,
    pub local_path: PathBuf,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFileToLocalParams {
    pub bucket_name: String,
    pub key: String,
    pub local_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteObjectParams {
    pub bucket_name: String,
    pub key: String,
}

/// A validated request for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ListBuckets(ListBucketsParams),
    ListBucket(ListBucketParams),
    GetObject(GetObjectParams),
    PutObject(PutObjectParams),
    UploadLocalFile(UploadLocalFileParams),
    DownloadFileToLocal(DownloadFileToLocalParams),
    DeleteObject(DeleteObjectParams),
}

/// Why a request could not be turned into an [`Operation`]
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid arguments for {operation}: {source}")]
    InvalidArguments {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Operation {
    /// Structurally validate `arguments` for the operation called `name`.
    ///
    /// Missing required fields and wrong types are rejected; values are not
    /// inspected. A `null` argument set is treated as empty.
    pub fn from_request(name: &str, arguments: serde_json::Value) -> Result<Self, RequestError> {
        let arguments = if arguments.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            arguments
        };

        fn parse<T: serde::de::DeserializeOwned>(
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<T, RequestError> {
            serde_json::from_value(arguments).map_err(|source| RequestError::InvalidArguments {
                operation: name.to_string(),
                source,
            })
        }

        let operation = match name {
            "list_buckets" => Self::ListBuckets(parse(name, arguments)?),
            "list_bucket" => Self::ListBucket(parse(name, arguments)?),
            "get_object" => Self::GetObject(parse(name, arguments)?),
            "put_object" => Self::PutObject(parse(name, arguments)?),
            "upload_local_file" => Self::UploadLocalFile(parse(name, arguments)?),
            "download_file_to_local" => Self::DownloadFileToLocal(parse(name, arguments)?),
            "delete_object" => Self::DeleteObject(parse(name, arguments)?),
            other => return Err(RequestError::UnknownOperation(other.to_string())),
        };
        Ok(operation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListBuckets(_) => "list_buckets",
            Self::ListBucket(_) => "list_bucket",
            Self::GetObject(_) => "get_object",
            Self::PutObject(_) => "put_object",
            Self::UploadLocalFile(_) => "upload_local_file",
            Self::DownloadFileToLocal(_) => "download_file_to_local",
            Self::DeleteObject(_) => "delete_object",
        }
    }

    /// Run against the shared backend and wrap the outcome
    pub async fn execute(self, backend: &dyn ObjectBackend) -> OperationResult {
        let name = self.name();
        tracing::debug!(operation = name, "Dispatching storage operation");

        let result = match self {
            Self::ListBuckets(_) => list_buckets(backend).await,
            Self::ListBucket(p) => list_bucket(backend, &p.bucket_name, &p.key_prefix).await,
            Self::GetObject(p) => get_object(backend, &p.bucket_name, &p.key).await,
            Self::PutObject(p) => put_object(backend, &p.bucket_name, &p.key, p.body).await,
            Self::UploadLocalFile(p) => {
                upload_local_file(backend, &p.bucket_name, p.local_path, &p.key).await
            }
            Self::DownloadFileToLocal(p) => {
                download_file_to_local(backend, &p.bucket_name, &p.key, p.local_path).await
            }
            Self::DeleteObject(p) => delete_object(backend, &p.bucket_name, &p.key).await,
        };

        if let OperationResult::Failure(message) = &result {
            tracing::warn!(operation = name, error = %message, "Storage operation failed");
        }
        result
    }
}

/// Success payload, shaped per operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buckets(Vec<String>),
    Listing(BucketListing),
    Object(Bytes),
    Ack,
}

/// The envelope every operation returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Success(Payload),
    Failure(String),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// JSON form of the envelope.
    ///
    /// Object bodies have no JSON form of their own; they appear as
    /// `{"size": n}` here and are rendered by the transport instead.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Success(Payload::Buckets(buckets)) => serde_json::json!({ "buckets": buckets }),
            Self::Success(Payload::Listing(listing)) => {
                serde_json::to_value(listing).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
            }
            Self::Success(Payload::Object(data)) => serde_json::json!({ "size": data.len() }),
            Self::Success(Payload::Ack) => serde_json::json!({ "success": true }),
            Self::Failure(message) => serde_json::json!({ "error": message }),
        }
    }
}

/// Recover region around one backend call. Errors and panics both become
/// `Failure`; the message is never empty.
async fn guarded<T, F>(fut: F, wrap: impl FnOnce(T) -> Payload) -> OperationResult
where
    F: Future<Output = StorageResult<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => OperationResult::Success(wrap(value)),
        Ok(Err(e)) => OperationResult::Failure(non_empty(e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "backend panicked".to_string());
            OperationResult::Failure(non_empty(message))
        }
    }
}

fn non_empty(message: String) -> String {
    if message.trim().is_empty() {
        "unknown backend error".to_string()
    } else {
        message
    }
}

fn bucket_not_set() -> OperationResult {
    OperationResult::Failure(BUCKET_NOT_SET.to_string())
}

pub async fn list_buckets(backend: &dyn ObjectBackend) -> OperationResult {
    guarded(backend.list_buckets(), Payload::Buckets).await
}

pub async fn list_bucket(backend: &dyn ObjectBackend, bucket_name: &str, key_prefix: &str) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.list_objects(bucket_name, key_prefix), |files| {
        Payload::Listing(BucketListing {
            bucket: bucket_name.to_string(),
            files,
        })
    })
    .await
}

pub async fn get_object(backend: &dyn ObjectBackend, bucket_name: &str, key: &str) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.get_object(bucket_name, key), Payload::Object).await
}

pub async fn put_object(
    backend: &dyn ObjectBackend,
    bucket_name: &str,
    key: &str,
    body: String,
) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.put_object(bucket_name, key, Bytes::from(body)), |_| Payload::Ack).await
}

pub async fn upload_local_file(
    backend: &dyn ObjectBackend,
    bucket_name: &str,
    local_path: PathBuf,
    key: &str,
) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.upload_file(bucket_name, &local_path, key), |_| Payload::Ack).await
}

pub async fn download_file_to_local(
    backend: &dyn ObjectBackend,
    bucket_name: &str,
    key: &str,
    local_path: PathBuf,
) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.download_file(bucket_name, key, &local_path), |_| Payload::Ack).await
}

pub async fn delete_object(backend: &dyn ObjectBackend, bucket_name: &str, key: &str) -> OperationResult {
    if bucket_name.is_empty() {
        return bucket_not_set();
    }
    guarded(backend.delete_object(bucket_name, key), |_| Payload::Ack).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::error::StorageError;
    use crate::types::ObjectDescriptor;
    use std::path::Path;
    use tempfile::TempDir;

    /// Backend whose every call fails the same way
    struct FailingBackend;

    #[async_trait::async_trait]
    impl ObjectBackend for FailingBackend {
        async fn list_buckets(&self) -> StorageResult<Vec<String>> {
            Err(StorageError::backend("ListBuckets", "Access Denied"))
        }
        async fn list_objects(&self, _: &str, _: &str) -> StorageResult<Vec<ObjectDescriptor>> {
            Err(StorageError::backend("ListObjectsV2", "NoSuchBucket"))
        }
        async fn get_object(&self, _: &str, _: &str) -> StorageResult<Bytes> {
            Err(StorageError::backend("GetObject", "NoSuchKey"))
        }
        async fn put_object(&self, _: &str, _: &str, _: Bytes) -> StorageResult<()> {
            Err(StorageError::backend("PutObject", "Access Denied"))
        }
        async fn upload_file(&self, _: &str, _: &Path, _: &str) -> StorageResult<()> {
            Err(StorageError::backend("PutObject", "Access Denied"))
        }
        async fn download_file(&self, _: &str, _: &str, _: &Path) -> StorageResult<()> {
            Err(StorageError::backend("GetObject", "NoSuchKey"))
        }
        async fn delete_object(&self, _: &str, _: &str) -> StorageResult<()> {
            Err(StorageError::backend("DeleteObject", "Access Denied"))
        }
    }

    /// Backend that panics on every call
    struct PanickingBackend;

    #[async_trait::async_trait]
    impl ObjectBackend for PanickingBackend {
        async fn list_buckets(&self) -> StorageResult<Vec<String>> {
            panic!("connection pool poisoned")
        }
        async fn list_objects(&self, _: &str, _: &str) -> StorageResult<Vec<ObjectDescriptor>> {
            panic!("unexpected listing shape")
        }
        async fn get_object(&self, _: &str, _: &str) -> StorageResult<Bytes> {
            panic!("body already consumed")
        }
        async fn put_object(&self, _: &str, _: &str, _: Bytes) -> StorageResult<()> {
            panic!("{}", String::from("put exploded"))
        }
        async fn upload_file(&self, _: &str, _: &Path, _: &str) -> StorageResult<()> {
            panic!("upload exploded")
        }
        async fn download_file(&self, _: &str, _: &str, _: &Path) -> StorageResult<()> {
            panic!("download exploded")
        }
        async fn delete_object(&self, _: &str, _: &str) -> StorageResult<()> {
            panic!("delete exploded")
        }
    }

    fn all_operations(dir: &Path) -> Vec<Operation> {
        vec![
            Operation::ListBuckets(ListBucketsParams {}),
            Operation::ListBucket(ListBucketParams {
                bucket_name: "b".to_string(),
                key_prefix: String::new(),
            }),
            Operation::GetObject(GetObjectParams {
                bucket_name: "b".to_string(),
                key: "k".to_string(),
            }),
            Operation::PutObject(PutObjectParams {
                bucket_name: "b".to_string(),
                key: "k".to_string(),
                body: "hello".to_string(),
            }),
            Operation::UploadLocalFile(UploadLocalFileParams {
                bucket_name: "b".to_string(),
                local_path: dir.join("in.txt"),
                key: "k".to_string(),
            }),
            Operation::DownloadFileToLocal(DownloadFileToLocalParams {
                bucket_name: "b".to_string(),
                key: "k".to_string(),
                local_path: dir.join("out.txt"),
            }),
            Operation::DeleteObject(DeleteObjectParams {
                bucket_name: "b".to_string(),
                key: "k".to_string(),
            }),
        ]
    }

    fn local_backend() -> (TempDir, LocalBackend) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("buckets");
        std::fs::create_dir_all(root.join("b")).unwrap();
        let backend = LocalBackend::new(root).unwrap();
        (temp_dir, backend)
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_envelope() {
        let temp_dir = TempDir::new().unwrap();
        for operation in all_operations(temp_dir.path()) {
            let name = operation.name();
            let result = operation.execute(&FailingBackend).await;
            match &result {
                OperationResult::Failure(message) => assert!(!message.is_empty(), "{}", name),
                other => panic!("{} should fail, got {:?}", name, other),
            }
            let json = result.to_json();
            assert!(json["error"].as_str().is_some_and(|m| !m.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_backend_panic_is_contained() {
        let temp_dir = TempDir::new().unwrap();
        for operation in all_operations(temp_dir.path()) {
            let result = operation.execute(&PanickingBackend).await;
            assert!(matches!(result, OperationResult::Failure(ref m) if !m.is_empty()));
        }

        let result = put_object(&PanickingBackend, "b", "k", "x".to_string()).await;
        assert_eq!(result, OperationResult::Failure("put exploded".to_string()));
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_next_call() {
        let (_temp_dir, backend) = local_backend();

        let missing = get_object(&backend, "b", "absent").await;
        assert!(!missing.is_success());

        let stored = put_object(&backend, "b", "present", "v".to_string()).await;
        assert_eq!(stored, OperationResult::Success(Payload::Ack));
    }

    #[tokio::test]
    async fn test_put_get_delete_list_scenario() {
        let (_temp_dir, backend) = local_backend();

        let put = put_object(&backend, "b", "k", "hello".to_string()).await;
        assert_eq!(put.to_json(), serde_json::json!({ "success": true }));

        let get = get_object(&backend, "b", "k").await;
        assert_eq!(get, OperationResult::Success(Payload::Object(Bytes::from("hello"))));

        let delete = delete_object(&backend, "b", "k").await;
        assert_eq!(delete.to_json(), serde_json::json!({ "success": true }));

        let list = list_bucket(&backend, "b", "k").await;
        assert_eq!(list.to_json(), serde_json::json!({ "bucket": "b", "files": [] }));
    }

    #[tokio::test]
    async fn test_put_overwrites_and_get_returns_latest() {
        let (_temp_dir, backend) = local_backend();

        put_object(&backend, "b", "notes.txt", "first".to_string()).await;
        put_object(&backend, "b", "notes.txt", "second".to_string()).await;

        let get = get_object(&backend, "b", "notes.txt").await;
        assert_eq!(get, OperationResult::Success(Payload::Object(Bytes::from("second"))));
    }

    #[tokio::test]
    async fn test_list_bucket_descriptors() {
        let (_temp_dir, backend) = local_backend();
        put_object(&backend, "b", "logs/app.log", "0123456789".to_string()).await;
        put_object(&backend, "b", "logs/db.log", "abc".to_string()).await;
        put_object(&backend, "b", "index.html", "<html/>".to_string()).await;

        let result = list_bucket(&backend, "b", "logs/").await;
        let json = result.to_json();
        assert_eq!(json["bucket"], "b");

        let files = json["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["key"], "logs/app.log");
        assert_eq!(files[0]["size"], 10);
        assert_eq!(files[1]["key"], "logs/db.log");
        assert_eq!(files[1]["size"], 3);

        let ts = files[0]["last_modified"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn test_list_bucket_unmatched_prefix_is_empty() {
        let (_temp_dir, backend) = local_backend();
        put_object(&backend, "b", "a.txt", "x".to_string()).await;

        let result = list_bucket(&backend, "b", "zzz").await;
        assert_eq!(
            result,
            OperationResult::Success(Payload::Listing(BucketListing {
                bucket: "b".to_string(),
                files: vec![],
            }))
        );
    }

    #[tokio::test]
    async fn test_delete_removes_from_listing() {
        let (_temp_dir, backend) = local_backend();
        put_object(&backend, "b", "keep", "1".to_string()).await;
        put_object(&backend, "b", "drop", "2".to_string()).await;

        delete_object(&backend, "b", "drop").await;

        let json = list_bucket(&backend, "b", "").await.to_json();
        let keys: Vec<&str> = json["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["keep"]);
    }

    #[tokio::test]
    async fn test_upload_then_download_roundtrip() {
        let (temp_dir, backend) = local_backend();
        let source = temp_dir.path().join("source.bin");
        let target = temp_dir.path().join("target.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        std::fs::write(&source, &content).unwrap();

        let up = upload_local_file(&backend, "b", source, "blobs/data.bin").await;
        assert_eq!(up, OperationResult::Success(Payload::Ack));

        let down = download_file_to_local(&backend, "b", "blobs/data.bin", target.clone()).await;
        assert_eq!(down, OperationResult::Success(Payload::Ack));

        assert_eq!(std::fs::read(&target).unwrap(), content);
    }

    #[tokio::test]
    async fn test_download_overwrites_existing_file() {
        let (temp_dir, backend) = local_backend();
        let target = temp_dir.path().join("existing.txt");
        std::fs::write(&target, "stale content that is longer").unwrap();

        put_object(&backend, "b", "fresh", "new".to_string()).await;
        download_file_to_local(&backend, "b", "fresh", target.clone()).await;

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_upload_missing_local_path_is_failure() {
        let (temp_dir, backend) = local_backend();
        let missing = temp_dir.path().join("does-not-exist.txt");

        let result = upload_local_file(&backend, "b", missing, "k").await;
        match result {
            OperationResult::Failure(message) => assert!(message.contains("does-not-exist.txt")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_buckets_empty_account() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp_dir.path().join("empty")).unwrap();

        let result = list_buckets(&backend).await;
        assert_eq!(result.to_json(), serde_json::json!({ "buckets": [] }));
    }

    #[tokio::test]
    async fn test_empty_bucket_name_rejected_before_backend() {
        // FailingBackend would report its own message if it were reached
        let temp_dir = TempDir::new().unwrap();
        for operation in all_operations(temp_dir.path()) {
            let operation = match operation {
                Operation::ListBuckets(_) => continue,
                Operation::ListBucket(mut p) => {
                    p.bucket_name.clear();
                    Operation::ListBucket(p)
                }
                Operation::GetObject(mut p) => {
                    p.bucket_name.clear();
                    Operation::GetObject(p)
                }
                Operation::PutObject(mut p) => {
                    p.bucket_name.clear();
                    Operation::PutObject(p)
                }
                Operation::UploadLocalFile(mut p) => {
                    p.bucket_name.clear();
                    Operation::UploadLocalFile(p)
                }
                Operation::DownloadFileToLocal(mut p) => {
                    p.bucket_name.clear();
                    Operation::DownloadFileToLocal(p)
                }
                Operation::DeleteObject(mut p) => {
                    p.bucket_name.clear();
                    Operation::DeleteObject(p)
                }
            };
            let name = operation.name();
            let result = operation.execute(&FailingBackend).await;
            assert_eq!(result, OperationResult::Failure(BUCKET_NOT_SET.to_string()), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_failed_download_leaves_local_file_intact() {
        let (temp_dir, backend) = local_backend();
        let target = temp_dir.path().join("keep.txt");
        std::fs::write(&target, "keep").unwrap();

        let result = download_file_to_local(&backend, "b", "absent", target.clone()).await;

        assert!(matches!(result, OperationResult::Failure(_)));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep");
    }

    #[test]
    fn test_from_request_defaults_prefix() {
        let op = Operation::from_request(
            "list_bucket",
            serde_json::json!({ "bucket_name": "photos" }),
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::ListBucket(ListBucketParams {
                bucket_name: "photos".to_string(),
                key_prefix: String::new(),
            })
        );
    }

    #[test]
    fn test_from_request_missing_required() {
        let err = Operation::from_request("put_object", serde_json::json!({ "bucket_name": "b", "key": "k" }))
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidArguments { .. }));
        assert!(err.to_string().contains("body"));
    }

    #[test]
    fn test_from_request_null_arguments() {
        let op = Operation::from_request("list_buckets", serde_json::Value::Null).unwrap();
        assert_eq!(op.name(), "list_buckets");
    }

    #[test]
    fn test_from_request_unknown() {
        assert!(matches!(
            Operation::from_request("copy_object", serde_json::json!({})),
            Err(RequestError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_operation_names_cover_all() {
        for name in OPERATION_NAMES {
            let err = Operation::from_request(name, serde_json::json!({ "unexpected": 1 }));
            // Only list_buckets accepts an argument set without required fields
            assert_eq!(err.is_ok(), name == "list_buckets", "{}", name);
        }
    }
}
