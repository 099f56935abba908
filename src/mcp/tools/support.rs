//! Support Case Tools
//!
//! Tools for reading and replying to support cases through the API.
//! Failures come back as plain text in the tool result so the calling
//! agent sees what went wrong instead of a dead JSON-RPC stream.

use serde::Deserialize;
use serde_json::Value;

use crate::mcp::client::{ApiClient, ApiClientError};
use crate::mcp::protocol::{McpError, ToolsCallResult};
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolResult};

/// Register support case tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(get_all_support_cases_tool());
    registry.register_tool(get_support_case_messages_tool());
    registry.register_tool(reply_to_support_case_tool());
}

fn failure_text(endpoint: &str, err: ApiClientError) -> ToolsCallResult {
    ToolsCallResult::error(format!("Error: Failed to call {}: {}", endpoint, err))
}

// ============================================================================
// get_all_support_cases
// ============================================================================

fn get_all_support_cases_tool() -> RegisteredTool {
    RegisteredTool::new(
        "get_all_support_cases",
        "List every support case in the system, most recently updated first",
        serde_json::json!({
            "type": "object",
            "properties": {}
        }),
        get_all_support_cases_handler,
    )
}

async fn get_all_support_cases_handler(client: ApiClient, _params: Value) -> ToolResult {
    let endpoint = "/support-cases";

    match client.get(endpoint).await {
        Ok(cases) => {
            ToolsCallResult::json(&cases).map_err(|e| McpError::InternalError(e.to_string()))
        }
        Err(e) => Ok(failure_text(endpoint, e)),
    }
}

// ============================================================================
// get_support_case_messages
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetCaseMessagesParams {
    case_id: u64,
}

fn get_support_case_messages_tool() -> RegisteredTool {
    RegisteredTool::new(
        "get_support_case_messages",
        "Read the full message thread of one support case, oldest first",
        serde_json::json!({
            "type": "object",
            "properties": {
                "caseId": {
                    "type": "integer",
                    "description": "Numeric identifier of the support case"
                }
            },
            "required": ["caseId"]
        }),
        get_support_case_messages_handler,
    )
}

async fn get_support_case_messages_handler(client: ApiClient, params: Value) -> ToolResult {
    let params: GetCaseMessagesParams =
        serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    let endpoint = format!("/support-cases/{}/messages", params.case_id);

    match client.get(&endpoint).await {
        Ok(messages) => {
            ToolsCallResult::json(&messages).map_err(|e| McpError::InternalError(e.to_string()))
        }
        Err(e) => Ok(failure_text(&endpoint, e)),
    }
}

// ============================================================================
// reply_to_support_case
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyToCaseParams {
    case_id: u64,
    message: String,
}

fn reply_to_support_case_tool() -> RegisteredTool {
    RegisteredTool::new(
        "reply_to_support_case",
        "Post a reply message to a support case as the support team",
        serde_json::json!({
            "type": "object",
            "properties": {
                "caseId": {
                    "type": "integer",
                    "description": "Numeric identifier of the support case"
                },
                "message": {
                    "type": "string",
                    "description": "Reply text to append to the case"
                }
            },
            "required": ["caseId", "message"]
        }),
        reply_to_support_case_handler,
    )
}

async fn reply_to_support_case_handler(client: ApiClient, params: Value) -> ToolResult {
    let params: ReplyToCaseParams =
        serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

    // Caught here so an empty reply never reaches the API.
    if params.message.trim().is_empty() {
        return Ok(ToolsCallResult::error("Error: Message cannot be empty"));
    }

    let endpoint = format!("/support-cases/{}/messages", params.case_id);
    let body = serde_json::json!({ "message": params.message });

    match client.post(&endpoint, &body).await {
        Ok(message) => {
            ToolsCallResult::json(&message).map_err(|e| McpError::InternalError(e.to_string()))
        }
        Err(e) => Ok(failure_text(&endpoint, e)),
    }
}
