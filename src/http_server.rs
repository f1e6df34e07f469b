//! Plain HTTP surface: JSON endpoints, the SSE streaming variant, and the
//! two static test pages.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ProxyError;
use crate::handlers::{self, AppState, AskReply, AskRequest};

const INDEX_PAGE: &str = include_str!("../static/index.html");
const STREAM_PAGE: &str = include_str!("../static/stream.html");

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/stream", get(stream_page))
        .route("/ask_poe", get(ask_poe))
        .route("/ask_poe_stream", get(ask_poe_stream))
        .route("/list_available_models", get(list_available_models))
        .route("/get_server_info", get(get_server_info))
        .route("/clear_session", post(clear_session))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves until the cancellation token fires.
pub async fn serve(
    state: Arc<AppState>,
    bind_addr: SocketAddr,
    ct: CancellationToken,
) -> Result<(), Box<dyn StdError + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await?;

    Ok(())
}

/// JSON error envelope with a non-2xx status per error kind.
struct ApiError(ProxyError);

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ProxyError::InvalidRequest(_) | ProxyError::InvalidModel(_) => StatusCode::BAD_REQUEST,
            ProxyError::Auth(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Upstream(_) | ProxyError::ProtocolMismatch(_) => StatusCode::BAD_GATEWAY,
            // Not reachable through the buffered path; mapped defensively.
            ProxyError::Canceled => StatusCode::BAD_GATEWAY,
        };
        let body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct AskParams {
    bot: String,
    prompt: String,
    session_id: Option<String>,
}

impl From<AskParams> for AskRequest {
    fn from(params: AskParams) -> Self {
        AskRequest {
            bot: params.bot,
            prompt: params.prompt,
            session_id: params.session_id,
        }
    }
}

async fn ask_poe(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
) -> Result<Json<AskReply>, ApiError> {
    let reply = handlers::ask(&state, params.into(), None).await?;
    Ok(Json(reply))
}

/// Envelope for the SSE stream: zero or more progress events, then exactly
/// one result or error event.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum StreamEnvelope {
    Progress { text: String },
    Result(AskReply),
    Error { message: String },
}

async fn ask_poe_stream(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<StreamEnvelope>(16);
    let request: AskRequest = params.into();

    tokio::spawn(async move {
        let (frag_tx, mut frag_rx) = mpsc::channel::<String>(16);

        // Fragments and the terminal event share one ordered channel; the
        // forwarder is drained before the terminal event is queued.
        let forwarder = tokio::spawn({
            let tx = tx.clone();
            async move {
                while let Some(text) = frag_rx.recv().await {
                    if tx.send(StreamEnvelope::Progress { text }).await.is_err() {
                        break;
                    }
                }
            }
        });

        let result = handlers::ask(&state, request, Some(&frag_tx)).await;
        drop(frag_tx);
        let _ = forwarder.await;

        match result {
            Ok(reply) => {
                let _ = tx.send(StreamEnvelope::Result(reply)).await;
            }
            // The client is gone; there is nobody to tell.
            Err(ProxyError::Canceled) => {}
            Err(err) => {
                error!(kind = err.kind(), %err, "streaming ask failed");
                let _ = tx
                    .send(StreamEnvelope::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|envelope| {
        let payload = serde_json::to_string(&envelope)
            .unwrap_or_else(|_| r#"{"type":"error","data":{"message":"serialization failed"}}"#.to_string());
        Ok::<Event, Infallible>(Event::default().data(payload))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn list_available_models() -> Json<serde_json::Value> {
    Json(json!({ "models": handlers::list_models() }))
}

async fn get_server_info(State(state): State<Arc<AppState>>) -> Json<handlers::ServerInfoReply> {
    Json(handlers::server_info(&state).await)
}

#[derive(Debug, Deserialize)]
struct ClearSessionForm {
    session_id: String,
}

async fn clear_session(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ClearSessionForm>,
) -> Json<handlers::ClearSessionReply> {
    Json(handlers::clear_session(&state, &form.session_id).await)
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn stream_page() -> Html<&'static str> {
    Html(STREAM_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_expected_statuses() {
        let cases = [
            (
                ProxyError::InvalidRequest("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ProxyError::InvalidModel("x".into()), StatusCode::BAD_REQUEST),
            (ProxyError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (ProxyError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn stream_envelopes_match_the_wire_shape() {
        let progress = serde_json::to_value(StreamEnvelope::Progress {
            text: "chunk".into(),
        })
        .unwrap();
        assert_eq!(progress["type"], "progress");
        assert_eq!(progress["data"]["text"], "chunk");

        let result = serde_json::to_value(StreamEnvelope::Result(AskReply {
            text: "full".into(),
            session_id: "abc".into(),
            warning: None,
        }))
        .unwrap();
        assert_eq!(result["type"], "result");
        assert_eq!(result["data"]["session_id"], "abc");
        assert!(result["data"].get("warning").is_none());
    }
}
