//! Request handlers shared by the MCP and HTTP front ends.
//!
//! Each operation composes the session store and the upstream adapter and
//! returns plain data; the transports only translate those results into
//! their own envelopes.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProxyError;
use crate::models::{self, ModelInfo};
use crate::poe::{BotClient, BotQuery, ProtocolMode};
use crate::session::SessionStore;

pub const SERVER_NAME: &str = "poe-proxy";

/// Process-wide state, constructed once at startup and passed explicitly
/// to both front ends.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub client: Arc<dyn BotClient>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, client: Arc<dyn BotClient>) -> Self {
        let sessions = SessionStore::new(config.session_expiry);
        Self {
            config,
            sessions,
            client,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub bot: String,
    pub prompt: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskReply {
    pub text: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServerInfoReply {
    pub name: &'static str,
    pub version: &'static str,
    pub claude_compatible: bool,
    pub active_sessions: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ClearSessionReply {
    pub status: &'static str,
    pub message: String,
}

/// Runs one ask end to end: validate, load history, relay the upstream
/// fragment stream, and record the completed exchange.
///
/// When `forward` is given, every fragment is sent into it in emission
/// order before the reply is returned; a closed channel means the client
/// disconnected, in which case the upstream stream is released and the
/// session is left untouched.
///
/// A protocol shape mismatch detected before any fragment was emitted
/// triggers exactly one retry in compat mode; the reply then carries a
/// warning instead of failing.
pub async fn ask(
    state: &AppState,
    request: AskRequest,
    forward: Option<&mpsc::Sender<String>>,
) -> Result<AskReply, ProxyError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ProxyError::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    let model = models::find(&request.bot)
        .ok_or_else(|| ProxyError::InvalidModel(request.bot.clone()))?;

    let (session_id, history) = state
        .sessions
        .get_or_create(request.session_id.as_deref())
        .await;

    let query = BotQuery {
        bot: model.name.to_string(),
        prompt: prompt.to_string(),
        history,
    };

    let mut warning = None;
    let mut mode = ProtocolMode::Standard;
    let text = loop {
        match relay(state.client.as_ref(), &query, mode, forward).await {
            Ok(text) => break text,
            Err(ProxyError::ProtocolMismatch(message)) if mode == ProtocolMode::Standard => {
                warn!(bot = %query.bot, %message, "shape mismatch, retrying in compat mode");
                warning = Some(format!("upstream protocol fallback engaged: {message}"));
                mode = ProtocolMode::Compat;
            }
            Err(err) => return Err(err),
        }
    };

    state.sessions.append(&session_id, prompt, &text).await;
    info!(bot = %query.bot, session_id = %session_id, reply_len = text.len(), "ask completed");

    Ok(AskReply {
        text,
        session_id,
        warning,
    })
}

/// Drives a single upstream attempt, forwarding fragments as they arrive.
async fn relay(
    client: &dyn BotClient,
    query: &BotQuery,
    mode: ProtocolMode,
    forward: Option<&mpsc::Sender<String>>,
) -> Result<String, ProxyError> {
    let mut stream = client.query(query, mode).await?;
    let mut text = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if let Some(tx) = forward {
                    if tx.send(fragment.clone()).await.is_err() {
                        return Err(ProxyError::Canceled);
                    }
                }
                text.push_str(&fragment);
            }
            // Once fragments have been relayed a fallback retry would
            // duplicate them, so a late mismatch is a hard failure.
            Err(ProxyError::ProtocolMismatch(message)) if !text.is_empty() => {
                return Err(ProxyError::Upstream(format!(
                    "protocol mismatch mid-reply: {message}"
                )));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(text)
}

/// Static catalog, stable order across calls.
pub fn list_models() -> &'static [ModelInfo] {
    models::CATALOG
}

pub async fn server_info(state: &AppState) -> ServerInfoReply {
    ServerInfoReply {
        name: SERVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
        claude_compatible: state.config.claude_compatible,
        active_sessions: state.sessions.len().await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }
}

/// Success and not-found are both ordinary outcomes, distinguished only by
/// the status string.
pub async fn clear_session(state: &AppState, session_id: &str) -> ClearSessionReply {
    if state.sessions.clear(session_id).await {
        ClearSessionReply {
            status: "success",
            message: format!("Session {session_id} cleared"),
        }
    } else {
        ClearSessionReply {
            status: "not_found",
            message: format!("Session {session_id} not found"),
        }
    }
}
