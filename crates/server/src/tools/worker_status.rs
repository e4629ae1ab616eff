//! worker_status tool implementation.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use vrcache_client::{InstallReport, WorkerHost, WorkerState};
use vrcache_core::Error;

/// Output from the worker_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerStatusOutput {
    /// Lifecycle state of the active version, if any.
    pub state: Option<WorkerState>,
    pub cache_name: Option<String>,
    /// Result of the most recent install.
    pub install: Option<InstallReport>,
    /// Open clients known to the host.
    pub clients: usize,
}

/// Implementation of the worker_status tool.
pub async fn status_impl(host: &WorkerHost) -> Result<CallToolResult, McpError> {
    let worker = host.active_worker().await;
    let output = WorkerStatusOutput {
        state: worker.as_ref().map(|w| w.state()),
        cache_name: worker.as_ref().map(|w| w.cache_name().to_string()),
        install: worker.as_ref().and_then(|w| w.last_install()),
        clients: host.client_count(),
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{parse_output, started_host};

    #[tokio::test]
    async fn test_status_after_start() {
        let (host, _client, _scope) = started_host().await;

        let result = status_impl(&host).await.unwrap();
        let output: WorkerStatusOutput = parse_output(&result);

        assert_eq!(output.state, Some(WorkerState::Activated));
        assert_eq!(output.cache_name.as_deref(), Some("video-reverser-cache-v1"));
        assert!(output.install.unwrap().is_complete());
        assert_eq!(output.clients, 1);
    }
}
