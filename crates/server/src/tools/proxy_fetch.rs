//! proxy_fetch tool implementation.
//!
//! Routes one request through the worker, exactly as if the hosting
//! application had issued it.

use std::collections::BTreeMap;

use precache_client::resolve;
use precache_core::{Eligibility, ProxyRequest, RequestMode, ResponseKind, ServedFrom, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::json_result;
use crate::error::ToolError;

/// Input parameters for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// Absolute URL, or a path relative to the proxy origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin" (default), "cors" or "no-cors".
    #[serde(default)]
    pub mode: Option<String>,

    /// Request headers forwarded to the network.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Client session issuing the request.
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    /// URL of the response.
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub body_bytes: usize,
    /// Whether the response came from the cache or the network.
    pub served_from: ServedFrom,
    pub eligibility: Eligibility,
}

impl ProxyFetchParams {
    fn into_request(self, origin: &Url) -> Result<ProxyRequest, ToolError> {
        let url = resolve(origin, &self.url).map_err(|e| ToolError::InvalidInput(format!("url: {e}")))?;

        let mode = match self.mode.as_deref() {
            Some(mode) => mode
                .parse::<RequestMode>()
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?,
            None => RequestMode::SameOrigin,
        };

        if self.method.trim().is_empty() {
            return Err(ToolError::InvalidInput("method cannot be empty".into()));
        }

        let mut request = ProxyRequest::get(url).with_method(self.method.trim()).with_mode(mode);
        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }
        if let Some(client_id) = self.client_id {
            request = request.with_client(client_id);
        }
        Ok(request)
    }
}

/// Implementation of the proxy_fetch tool.
pub async fn fetch_impl(worker: &Worker, origin: &Url, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    let request = params.into_request(origin)?;
    let served = worker.fetch(&request).await?;

    let response = served.response;
    let output = ProxyFetchOutput {
        url: response.url.to_string(),
        status: response.status,
        kind: response.kind,
        body: String::from_utf8_lossy(&response.body).into_owned(),
        body_bytes: response.body.len(),
        headers: response.headers,
        served_from: served.source,
        eligibility: served.eligibility,
    };

    json_result(&output)
}
