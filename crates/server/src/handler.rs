//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{AssetFetchParams, asset_fetch::fetch_impl, cache::list_impl, worker_status::status_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use url::Url;
use vrcache_client::{ClientId, WorkerHost};

/// The main MCP server handler for vrcache.
///
/// Acts as one page under the worker scope: every fetch goes through the
/// host with the same client id.
#[derive(Clone)]
pub struct VrCacheServer {
    host: Arc<WorkerHost>,
    client: ClientId,
    scope: Url,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl VrCacheServer {
    /// Create a new server handler.
    pub fn new(host: Arc<WorkerHost>, client: ClientId, scope: Url) -> Self {
        Self { host, client, scope, tool_router: Self::tool_router() }
    }

    /// Fetch an asset through the offline worker.
    #[tool(description = "Fetch an asset as a page under the worker scope would. Cache first, network fallback.")]
    async fn asset_fetch(&self, params: Parameters<AssetFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.host, self.client, &self.scope, params.0).await
    }

    /// Report the lifecycle state of the active worker.
    #[tool(description = "Show the active worker's lifecycle state, cache name, and last install result.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.host).await
    }

    /// List cache stores and the current store's entries.
    #[tool(description = "List all cache stores and the requests cached in the current one.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.host).await
    }
}

impl ServerHandler for VrCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "vrcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::started_host;

    #[tokio::test]
    async fn test_router_lists_tools() {
        let (host, client, scope) = started_host().await;
        let server = VrCacheServer::new(Arc::new(host), client, scope);

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["asset_fetch", "cache_list", "worker_status"]);
    }
}
