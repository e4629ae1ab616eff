//! asset_fetch tool implementation.
//!
//! Issues a request on behalf of the server's page, the same way a page
//! under the worker scope would, and reports where the answer came from.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use vrcache_client::fetch::resolve;
use vrcache_client::{ClientId, FetchSource, WorkerHost};
use vrcache_core::{Error, Request, ResponseType};

/// Parameters for the asset_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchParams {
    /// Path relative to the worker scope (e.g. "./index.html") or an absolute URL.
    pub path: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the asset_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchOutput {
    /// The resolved request URL.
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub response_type: ResponseType,
    /// "cache" or "network".
    pub source: FetchSource,
    /// Whether a copy was queued for the cache.
    pub stored: bool,
    pub content_type: Option<String>,
    pub body_bytes: usize,
    /// Body as text, when it is valid UTF-8.
    pub body: Option<String>,
}

/// Implementation of the asset_fetch tool.
pub async fn fetch_impl(
    host: &WorkerHost, client: ClientId, scope: &Url, params: AssetFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.path.trim().is_empty() {
        return Err(Error::InvalidInput("path cannot be empty".into()).into());
    }

    let url = resolve(scope, &params.path).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let request = Request::new(&params.method, url.as_str());

    let outcome = host.dispatch_fetch(client, request).await?;
    let response = outcome.response;

    let status = response.status;
    let status_text = response.status_text.clone();
    let response_type = response.response_type;
    let content_type = response.content_type().map(str::to_string);
    let body = response.into_body();

    let output = AssetFetchOutput {
        url: url.to_string(),
        status,
        status_text,
        response_type,
        source: outcome.source,
        stored: outcome.stored,
        content_type,
        body_bytes: body.len(),
        body: std::str::from_utf8(&body).ok().map(str::to_string),
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
