// MCP tool definitions and the registry that dispatches to them

use crate::protocol::{CallToolResult, ToolAnnotations, ToolSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Why a tool call could not produce a result at all.
///
/// Storage failures are not here: they come back as an error envelope
/// inside an `Ok(CallToolResult)`.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments missing or of the wrong shape
    #[error("{0}")]
    InvalidArguments(String),

    #[error("Failed to serialize tool output: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult, ToolError>;

    /// Get the tool's tier
    fn tier(&self) -> ToolTier {
        ToolTier::Tier0
    }
}

/// Tool security tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolTier {
    /// Read-only operations
    Tier0,
    /// Writes that add or replace data
    Tier1,
    /// Removes data
    Tier2,
}

impl ToolTier {
    pub fn annotations(self) -> ToolAnnotations {
        ToolAnnotations {
            read_only_hint: self == ToolTier::Tier0,
            destructive_hint: self == ToolTier::Tier2,
        }
    }
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool already registered under its name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All tool schemas with tier annotations, sorted by name
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| {
                let mut schema = tool.schema();
                schema.annotations.get_or_insert_with(|| tool.tier().annotations());
                schema
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: serde_json::Value, required: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_string_with_default(description: &str, default: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description,
        "default": default
    })
}
