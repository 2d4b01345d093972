//! Error types for storage backends.

/// Result type for backend calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure raised by a storage backend during a single operation.
///
/// Callers never branch on the variant; the dispatcher flattens every
/// error into its display text.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The S3 API rejected the request or could not be reached.
    #[error("{operation} failed: {message}")]
    Backend { operation: &'static str, message: String },

    /// Local object store error.
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    /// Local file system error (upload source or download target).
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Bucket name the backend cannot address.
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    /// Object key the backend cannot address.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
