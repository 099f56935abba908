//! MCP Stdio Transport
//!
//! Speaks JSON-RPC over stdin/stdout, one message per line. Agent hosts
//! spawn the bridge as a subprocess and talk to it through these pipes,
//! so diagnostics must only ever go to stderr.

use anyhow::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::client::ApiClient;
use super::protocol::{
    methods, ClientInfo, InitializeParams, InitializeResult, McpError, McpRequest, McpResponse,
    PingResult, ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCapability, ToolsListResult,
    MCP_PROTOCOL_VERSION,
};
use super::registry::McpRegistry;

/// Read requests from stdin until it closes, answering each on stdout.
pub async fn run(registry: McpRegistry, client: ApiClient) -> Result<()> {
    info!("MCP bridge ready with {} tools", registry.tool_count());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut initialized = false;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_message(&line, &registry, &client, &mut initialized).await;

        if let Some(response) = response {
            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    debug!("stdin closed, shutting down");
    Ok(())
}

/// Handle a single MCP message
///
/// Returns `None` for notifications, which get no response.
pub async fn handle_message(
    text: &str,
    registry: &McpRegistry,
    client: &ApiClient,
    initialized: &mut bool,
) -> Option<McpResponse> {
    // Parse the request
    let request: McpRequest = match serde_json::from_str(text) {
        Ok(req) => req,
        Err(e) => {
            return Some(McpResponse::error(
                None,
                McpError::ParseError(e.to_string()),
            ));
        }
    };

    let request_id = request.id.clone();

    // Dispatch based on method
    let result = match request.method.as_str() {
        methods::INITIALIZE => handle_initialize(&request, initialized),
        methods::INITIALIZED | methods::SHUTDOWN => {
            // Notification, no response needed
            return None;
        }
        methods::PING => handle_ping(),
        methods::TOOLS_LIST => {
            if !*initialized {
                Err(McpError::InvalidRequest("Not initialized".to_string()))
            } else {
                handle_tools_list(registry)
            }
        }
        methods::TOOLS_CALL => {
            if !*initialized {
                Err(McpError::InvalidRequest("Not initialized".to_string()))
            } else {
                handle_tools_call(&request, registry, client).await
            }
        }
        other => Err(McpError::MethodNotFound(other.to_string())),
    };

    match result {
        Ok(value) => request_id.map(|id| McpResponse::success(id, value)),
        Err(error) => Some(McpResponse::error(request_id, error)),
    }
}

fn handle_initialize(request: &McpRequest, initialized: &mut bool) -> Result<Value, McpError> {
    let params: InitializeParams = request
        .params
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .unwrap_or(InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Default::default(),
            client_info: ClientInfo {
                name: "unknown".to_string(),
                version: "unknown".to_string(),
            },
        });

    debug!(
        "MCP client connected: {} {}",
        params.client_info.name, params.client_info.version
    );

    *initialized = true;

    let result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: None }),
        },
        server_info: ServerInfo {
            name: "supportdesk-mcp".to_string(),
            version: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        },
    };

    serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
}

fn handle_ping() -> Result<Value, McpError> {
    serde_json::to_value(PingResult {}).map_err(|e| McpError::InternalError(e.to_string()))
}

fn handle_tools_list(registry: &McpRegistry) -> Result<Value, McpError> {
    let result = ToolsListResult {
        tools: registry.tool_definitions(),
    };

    serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
}

async fn handle_tools_call(
    request: &McpRequest,
    registry: &McpRegistry,
    client: &ApiClient,
) -> Result<Value, McpError> {
    let params: ToolsCallParams = request
        .params
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))?
        .ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))?;

    let tool = registry
        .get_tool(&params.name)
        .ok_or_else(|| McpError::MethodNotFound(format!("Unknown tool: {}", params.name)))?;

    debug!("Calling tool {}", tool.name);

    let arguments = params.arguments.unwrap_or(serde_json::json!({}));
    let result = (tool.handler)(client.clone(), arguments).await?;

    serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
}
