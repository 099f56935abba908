//! MCP (Model Context Protocol) Bridge
//!
//! Lets an LLM agent host work support cases through three tools: list
//! cases, read a case thread, post a reply. The bridge runs as its own
//! binary speaking newline-delimited JSON-RPC on stdin/stdout, and every
//! tool call becomes an HTTP request to the support-case API carrying
//! the bearer key the bridge was started with. Authorization therefore
//! stays server-side; the bridge holds no policy of its own.

pub mod client;
pub mod protocol;
pub mod registry;
pub mod stdio;
pub mod tools;

pub use client::{ApiClient, ApiClientError};
pub use protocol::{McpError, McpRequest, McpResponse};
pub use registry::McpRegistry;
