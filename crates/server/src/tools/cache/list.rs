//! cache_list tool implementation.
//!
//! Lists every cache store and the entries of the current one.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use vrcache_client::WorkerHost;
use vrcache_core::Error;

/// A cached request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachedRequest {
    pub method: String,
    pub url: String,
}

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    /// All store names, oldest first.
    pub caches: Vec<String>,
    /// Store used by the active worker.
    pub current: String,
    /// Requests stored under `current`.
    pub entries: Vec<CachedRequest>,
}

/// Implementation of the cache_list tool.
pub async fn list_impl(host: &WorkerHost) -> Result<CallToolResult, McpError> {
    let worker = host
        .active_worker()
        .await
        .ok_or_else(|| Error::InvalidState("no active worker".into()))?;

    let store = worker.store();
    let caches = store.keys().await?;
    let entries = store
        .entries(worker.cache_name())
        .await?
        .into_iter()
        .map(|r| CachedRequest { method: r.method, url: r.url })
        .collect();

    let output = CacheListOutput { caches, current: worker.cache_name().to_string(), entries };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
