// Core storage layer for the pail MCP server: configuration, backends,
// and the operation envelope the tools are built on

pub mod backend;
pub mod config;
pub mod error;
pub mod operations;
pub mod types;

pub use backend::{connect, LocalBackend, ObjectBackend, S3Backend};
pub use config::{BackendKind, PailConfig, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use operations::{Operation, OperationResult, Payload};
pub use types::*;
