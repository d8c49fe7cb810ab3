//! cache_list tool implementation.

use precache_core::{CacheDb, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::get::target_instance;
use crate::tools::json_result;

/// Parameters for the cache_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheListParams {
    /// Instance to list (default: the live instance).
    #[serde(default)]
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListedEntry {
    pub method: String,
    pub url: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    pub instance: String,
    pub entries: Vec<ListedEntry>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(worker: &Worker, db: &CacheDb, params: CacheListParams) -> Result<CallToolResult, McpError> {
    let instance = target_instance(worker, params.instance).await?;
    let entries = db
        .list_entries(&instance)
        .await?
        .into_iter()
        .map(|(method, url, status)| ListedEntry { method, url, status })
        .collect();

    json_result(&CacheListOutput { instance: instance.to_string(), entries })
}
