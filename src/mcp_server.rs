//! MCP tool surface, served over stdio.
//!
//! Tool parameter/result shapes mirror the HTTP endpoints. Validation
//! failures become `invalid_params`; upstream failures are returned as
//! tool-error results rather than protocol errors, so callers always get
//! a readable message back.

use std::error::Error as StdError;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
    transport::io,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde_json::json;
use tracing::info;

use crate::error::ProxyError;
use crate::handlers::{self, AppState, AskRequest};

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct AskArgs {
    /// Name of the Poe bot to query, e.g. "GPT-4o".
    pub bot: String,
    /// The question or instruction to send.
    pub prompt: String,
    /// Session id from a previous ask_poe call, for multi-turn context.
    pub session_id: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ClearSessionArgs {
    /// Id of the session to clear.
    pub session_id: String,
}

#[derive(Clone)]
pub struct PoeProxyServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PoeProxyServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "ask_poe",
        description = "Ask a Poe-hosted bot a question. Pass the returned session_id back in to continue the same conversation."
    )]
    async fn ask_poe(
        &self,
        Parameters(args): Parameters<AskArgs>,
    ) -> Result<CallToolResult, McpError> {
        let request = AskRequest {
            bot: args.bot,
            prompt: args.prompt,
            session_id: args.session_id,
        };

        match handlers::ask(&self.state, request, None).await {
            Ok(reply) => {
                let payload = serde_json::to_string(&reply)
                    .map_err(|err| McpError::internal_error(err.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(payload)]))
            }
            Err(err @ ProxyError::InvalidRequest(_)) | Err(err @ ProxyError::InvalidModel(_)) => {
                Err(McpError::invalid_params(err.to_string(), None))
            }
            Err(err) => Ok(CallToolResult::error(vec![Content::text(format!(
                "{}: {}",
                err.kind(),
                err
            ))])),
        }
    }

    #[tool(
        name = "list_available_models",
        description = "List the Poe bots this proxy can address, with context length and capability flags."
    )]
    async fn list_available_models(&self) -> Result<CallToolResult, McpError> {
        let payload = serde_json::to_string(&json!({ "models": handlers::list_models() }))
            .map_err(|err| McpError::internal_error(err.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(payload)]))
    }

    #[tool(
        name = "get_server_info",
        description = "Return proxy version, uptime, and session statistics."
    )]
    async fn get_server_info(&self) -> Result<CallToolResult, McpError> {
        let info = handlers::server_info(&self.state).await;
        let payload = serde_json::to_string(&info)
            .map_err(|err| McpError::internal_error(err.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(payload)]))
    }

    #[tool(
        name = "clear_session",
        description = "Drop the stored conversation history for a session id. Clearing an unknown id is a no-op."
    )]
    async fn clear_session(
        &self,
        Parameters(args): Parameters<ClearSessionArgs>,
    ) -> Result<CallToolResult, McpError> {
        let reply = handlers::clear_session(&self.state, &args.session_id).await;
        let payload = serde_json::to_string(&reply)
            .map_err(|err| McpError::internal_error(err.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(payload)]))
    }
}

#[tool_handler]
impl ServerHandler for PoeProxyServer {
    fn get_info(&self) -> ServerInfo {
        // ServerInfo and Implementation are non-exhaustive; build from
        // defaults and assign.
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::from_build_env();
        info.instructions = Some(
            "Proxy for Poe.com hosted bots.\n\
            Use `ask_poe` with a bot name and prompt; reuse the returned session_id for follow-up turns.\n\
            `list_available_models` shows addressable bots; `clear_session` drops stored history."
                .to_string(),
        );
        info
    }
}

/// Serves the tool router on stdin/stdout until the peer disconnects.
pub async fn serve_stdio(state: Arc<AppState>) -> Result<(), Box<dyn StdError + Send + Sync>> {
    info!("MCP server starting on stdio");
    let service = PoeProxyServer::new(state);
    let server = service.serve(io::stdio()).await?;
    server.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::poe::{BotClient, BotQuery, FragmentStream, ProtocolMode};
    use crate::Config;

    struct NoopClient;

    #[async_trait]
    impl BotClient for NoopClient {
        async fn query(
            &self,
            _query: &BotQuery,
            _mode: ProtocolMode,
        ) -> Result<FragmentStream, ProxyError> {
            Err(ProxyError::Upstream("not wired in this test".to_string()))
        }
    }

    #[test]
    fn server_info_advertises_tools_and_instructions() {
        let config = Config::new("test-key".into(), true, 60, 60).expect("valid config");
        let state = Arc::new(AppState::new(config, Arc::new(NoopClient)));
        let info = PoeProxyServer::new(state).get_info();

        assert!(info.capabilities.tools.is_some());
        let instructions = info.instructions.expect("instructions are set");
        assert!(instructions.contains("ask_poe"));
    }
}
