//! cache_get tool implementation.
//!
//! Looks up the stored entry for one request key without touching the
//! network.

use precache_client::resolve;
use precache_core::{CacheDb, CacheIdentity, Error, ResponseKind, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL, or a path relative to the proxy origin.
    pub url: String,

    /// HTTP method of the stored request (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Instance to search (default: the live instance).
    #[serde(default)]
    pub instance: Option<String>,
}

/// Output from the cache_get tool. The body itself is reported by size only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub instance: String,
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    pub body_bytes: usize,
    pub stored_at: String,
}

/// Instance named by the caller, else the live one.
pub(crate) async fn target_instance(worker: &Worker, name: Option<String>) -> Result<CacheIdentity, McpError> {
    match name {
        Some(name) if !name.trim().is_empty() => Ok(CacheIdentity::from_name(name.trim())),
        _ => worker
            .live()
            .await
            .ok_or_else(|| Error::CacheMiss("no live cache instance".into()).into()),
    }
}

/// Implementation of the cache_get tool.
pub async fn get_impl(
    worker: &Worker, db: &CacheDb, origin: &Url, params: CacheGetParams,
) -> Result<CallToolResult, McpError> {
    let url = resolve(origin, &params.url).map_err(|e| ToolError::InvalidInput(format!("url: {e}")))?;
    let method = params.method.as_deref().map(str::trim).unwrap_or("GET").to_ascii_uppercase();
    let instance = target_instance(worker, params.instance).await?;

    let entry = db
        .match_entry(&instance, &method, url.as_str())
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{method} {url} in {instance}")))?;

    json_result(&CacheGetOutput {
        instance: instance.to_string(),
        key_hash: entry.key_hash,
        method: entry.method,
        url: entry.url,
        status: entry.status_code,
        kind: entry.kind,
        headers: entry.headers,
        body_bytes: entry.body.len(),
        stored_at: entry.stored_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{ORIGIN, StaticSite, output, worker};
    use std::sync::Arc;

    fn origin() -> Url {
        Url::parse(ORIGIN).unwrap()
    }

    fn params(url: &str) -> CacheGetParams {
        CacheGetParams { url: url.to_string(), method: None, instance: None }
    }

    #[tokio::test]
    async fn test_get_impl_seeded_entry() {
        let site = Arc::new(StaticSite::new(&[("/app.js", 200, "console.log(1)")]));
        let (worker, db) = worker(site, &["/app.js"]).await;
        worker.run_lifecycle().await.unwrap();

        let out: CacheGetOutput = output(&get_impl(&worker, &db, &origin(), params("/app.js")).await.unwrap());

        assert_eq!(out.url, "http://localhost:8083/app.js");
        assert_eq!(out.method, "GET");
        assert_eq!(out.status, 200);
        assert_eq!(out.body_bytes, "console.log(1)".len());
        assert_eq!(out.instance, worker.identity().to_string());
    }

    #[tokio::test]
    async fn test_get_impl_missing() {
        let site = Arc::new(StaticSite::new(&[]));
        let (worker, db) = worker(site, &[]).await;
        worker.run_lifecycle().await.unwrap();

        let err = get_impl(&worker, &db, &origin(), params("/nothing.css")).await.unwrap_err();

        assert!(err.message.starts_with("CACHE_MISS"));
    }

    #[tokio::test]
    async fn test_get_impl_other_method_misses() {
        let site = Arc::new(StaticSite::new(&[("/app.js", 200, "x")]));
        let (worker, db) = worker(site, &["/app.js"]).await;
        worker.run_lifecycle().await.unwrap();

        let params = CacheGetParams { method: Some("head".into()), ..params("/app.js") };
        let result = get_impl(&worker, &db, &origin(), params).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_waiting_instance_by_name() {
        let site = Arc::new(StaticSite::new(&[("/app.js", 200, "x")]));
        let (worker, db) = worker(site, &["/app.js"]).await;
        worker.dispatch(precache_core::WorkerEvent::Install).await.unwrap();

        assert!(get_impl(&worker, &db, &origin(), params("/app.js")).await.is_err());

        let named = CacheGetParams { instance: Some(worker.identity().to_string()), ..params("/app.js") };
        let out: CacheGetOutput = output(&get_impl(&worker, &db, &origin(), named).await.unwrap());
        assert_eq!(out.status, 200);
    }
}
