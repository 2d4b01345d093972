pub mod storage;
mod registry;

pub use storage::{register_storage_tools, StorageTool};
pub use registry::{
    json_schema_object, json_schema_string, json_schema_string_with_default, Tool, ToolError,
    ToolRegistry, ToolTier,
};
