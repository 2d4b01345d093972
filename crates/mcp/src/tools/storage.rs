// Object storage tools: one MCP tool per storage operation

use crate::protocol::{CallToolResult, ToolContent, ToolSchema};
use crate::tools::{
    json_schema_object, json_schema_string, json_schema_string_with_default, Tool, ToolError,
    ToolRegistry, ToolTier,
};
use base64::Engine;
use pail_core::operations::{Operation, OperationResult, Payload, OPERATION_NAMES};
use pail_core::ObjectBackend;
use std::sync::Arc;

const BINARY_MIME_TYPE: &str = "application/octet-stream";

/// One storage operation exposed as a tool over a shared backend handle
pub struct StorageTool {
    name: &'static str,
    backend: Arc<dyn ObjectBackend>,
}

impl StorageTool {
    /// `None` when `name` is not a storage operation
    pub fn new(name: &str, backend: Arc<dyn ObjectBackend>) -> Option<Self> {
        OPERATION_NAMES
            .iter()
            .find(|n| **n == name)
            .map(|name| Self {
                name: *name,
                backend,
            })
    }

    fn description(&self) -> &'static str {
        match self.name {
            "list_buckets" => "List all buckets",
            "list_bucket" => "List objects in a bucket",
            "get_object" => "Get an object from a bucket",
            "put_object" => "Put an object into a bucket",
            "upload_local_file" => "Upload a local file to a bucket",
            "download_file_to_local" => "Download a file from a bucket to a local path",
            _ => "Delete an object from a bucket",
        }
    }

    fn input_schema(&self) -> serde_json::Value {
        let bucket = json_schema_string("Name of the bucket");
        let key = json_schema_string("Object key within the bucket");
        let local_path = json_schema_string("Path on the local file system");

        match self.name {
            "list_buckets" => json_schema_object(serde_json::json!({}), vec![]),
            "list_bucket" => json_schema_object(
                serde_json::json!({
                    "bucket_name": bucket,
                    "key_prefix": json_schema_string_with_default(
                        "Only list keys starting with this prefix",
                        ""
                    )
                }),
                vec!["bucket_name"],
            ),
            "put_object" => json_schema_object(
                serde_json::json!({
                    "bucket_name": bucket,
                    "key": key,
                    "body": json_schema_string("Content to store")
                }),
                vec!["bucket_name", "key", "body"],
            ),
            "upload_local_file" => json_schema_object(
                serde_json::json!({
                    "bucket_name": bucket,
                    "local_path": local_path,
                    "key": key
                }),
                vec!["bucket_name", "local_path", "key"],
            ),
            "download_file_to_local" => json_schema_object(
                serde_json::json!({
                    "bucket_name": bucket,
                    "key": key,
                    "local_path": local_path
                }),
                vec!["bucket_name", "key", "local_path"],
            ),
            // get_object, delete_object
            _ => json_schema_object(
                serde_json::json!({
                    "bucket_name": bucket,
                    "key": key
                }),
                vec!["bucket_name", "key"],
            ),
        }
    }
}

/// Register every storage tool against one backend
pub fn register_storage_tools(registry: &mut ToolRegistry, backend: Arc<dyn ObjectBackend>) {
    for name in OPERATION_NAMES {
        if let Some(tool) = StorageTool::new(name, backend.clone()) {
            registry.register(Arc::new(tool));
        }
    }
}

/// Render an operation envelope as MCP content.
///
/// Object bodies go out as text when they are UTF-8, otherwise as a base64
/// blob resource addressed by `object_uri`.
pub fn render(result: &OperationResult, object_uri: Option<&str>) -> Result<CallToolResult, ToolError> {
    match result {
        OperationResult::Success(Payload::Object(data)) => match std::str::from_utf8(data) {
            Ok(text) => Ok(CallToolResult::ok(ToolContent::text(text))),
            Err(_) => Ok(CallToolResult::ok(ToolContent::blob(
                object_uri.unwrap_or_default(),
                BINARY_MIME_TYPE,
                base64::engine::general_purpose::STANDARD.encode(data),
            ))),
        },
        OperationResult::Success(_) => Ok(CallToolResult::ok(ToolContent::text(
            serde_json::to_string(&result.to_json())?,
        ))),
        OperationResult::Failure(_) => Ok(CallToolResult::failed(ToolContent::text(
            serde_json::to_string(&result.to_json())?,
        ))),
    }
}

#[async_trait::async_trait]
impl Tool for StorageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            annotations: None,
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult, ToolError> {
        let operation = Operation::from_request(self.name, arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let object_uri = match &operation {
            Operation::GetObject(p) => Some(format!("s3://{}/{}", p.bucket_name, p.key)),
            _ => None,
        };

        tracing::info!(tool = self.name, "Executing storage tool");
        let result = operation.execute(self.backend.as_ref()).await;

        render(&result, object_uri.as_deref())
    }

    fn tier(&self) -> ToolTier {
        match self.name {
            "list_buckets" | "list_bucket" | "get_object" => ToolTier::Tier0,
            "delete_object" => ToolTier::Tier2,
            // put_object, upload_local_file, download_file_to_local
            _ => ToolTier::Tier1,
        }
    }
}
