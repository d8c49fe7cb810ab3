//! MCP tool implementations.
//!
//! This module contains all tools exposed by the precache proxy.

pub mod cache;
pub mod lifecycle;
pub mod proxy_fetch;

pub use lifecycle::{PostMessageParams, activate_impl, install_impl, message_impl};
pub use proxy_fetch::{ProxyFetchParams, fetch_impl};

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::OutputFailed(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
