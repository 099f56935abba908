//! MCP Tools
//!
//! Tool implementations forwarding to the support-case API.

pub mod support;

use super::registry::McpRegistry;

/// Register all tools with the registry
pub fn register_all_tools(registry: &mut McpRegistry) {
    support::register_tools(registry);
}
