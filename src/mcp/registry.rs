//! Registry of the tools the bridge exposes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::client::ApiClient;
use super::protocol::{McpError, ToolDefinition, ToolsCallResult};

pub type ToolResult = Result<ToolsCallResult, McpError>;

pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// Handlers get a clone of the bridge's API client plus the raw
/// `arguments` object from the `tools/call` request.
pub type ToolHandler = Arc<dyn Fn(ApiClient, Value) -> ToolFuture + Send + Sync>;

pub struct RegisteredTool {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

impl RegisteredTool {
    pub fn new<F, Fut>(
        name: &'static str,
        description: &'static str,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(ApiClient, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self {
            name,
            description,
            input_schema,
            handler: Arc::new(move |client, args| Box::pin(handler(client, args))),
        }
    }
}

/// Tools keyed by name, kept in name order so `tools/list` output does
/// not depend on registration order.
pub struct McpRegistry {
    tools: Vec<RegisteredTool>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registering a name twice replaces the earlier tool.
    pub fn register_tool(&mut self, tool: RegisteredTool) {
        match self.tools.binary_search_by(|t| t.name.cmp(tool.name)) {
            Ok(position) => self.tools[position] = tool,
            Err(position) => self.tools.insert(position, tool),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name.to_string(),
                description: tool.description.to_string(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

impl Default for McpRegistry {
    fn default() -> Self {
        Self::new()
    }
}
