//! reqwest-backed implementation of the upstream adapter.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ProxyError;
use crate::models;
use crate::poe::claude::ThinkingFilter;
use crate::poe::wire::{
    ErrorEventData, EventParser, QueryPayload, TextEventData, PROTOCOL_COMPAT, PROTOCOL_STANDARD,
};
use crate::poe::{BotClient, BotQuery, FragmentStream, ProtocolMode};

const FRAGMENT_CHANNEL_CAPACITY: usize = 16;

pub struct PoeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    claude_compatible: bool,
}

impl PoeClient {
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ProxyError::Upstream(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            claude_compatible: config.claude_compatible,
        })
    }
}

#[async_trait]
impl BotClient for PoeClient {
    async fn query(
        &self,
        query: &BotQuery,
        mode: ProtocolMode,
    ) -> Result<FragmentStream, ProxyError> {
        let model = models::find(&query.bot)
            .ok_or_else(|| ProxyError::InvalidModel(query.bot.clone()))?;

        let version = match mode {
            ProtocolMode::Standard => PROTOCOL_STANDARD,
            ProtocolMode::Compat => PROTOCOL_COMPAT,
        };
        let payload = QueryPayload::new(version, &query.history, &query.prompt);
        let url = format!("{}/{}", self.base_url, model.name);

        debug!(bot = model.name, ?mode, turns = payload.query.len(), "querying upstream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProxyError::Upstream("upstream request timed out".to_string())
                } else {
                    ProxyError::Upstream(format!("upstream request failed: {err}"))
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProxyError::Auth(
                    "Poe rejected the API key; check POE_API_KEY".to_string(),
                ));
            }
            status if !status.is_success() => {
                return Err(ProxyError::Upstream(format!(
                    "upstream returned HTTP {status}"
                )));
            }
            _ => {}
        }

        let strip_thinking =
            self.claude_compatible && model.is_claude && mode == ProtocolMode::Standard;
        let compat = mode == ProtocolMode::Compat;

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let mut body = response.bytes_stream();

        // Reader task: parse SSE events off the wire and forward fragments.
        // A failed send means the consumer is gone; returning drops the
        // response body and releases the upstream connection.
        tokio::spawn(async move {
            let mut parser = EventParser::new();
            let mut filter = strip_thinking.then(ThinkingFilter::new);

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx
                            .send(Err(ProxyError::Upstream(format!(
                                "upstream stream failed: {err}"
                            ))))
                            .await;
                        return;
                    }
                };

                for event in parser.push(&chunk) {
                    match event.name.as_str() {
                        "text" => {
                            let data: TextEventData = match serde_json::from_str(&event.data) {
                                Ok(data) => data,
                                Err(err) => {
                                    let _ = tx
                                        .send(Err(ProxyError::ProtocolMismatch(format!(
                                            "malformed text event: {err}"
                                        ))))
                                        .await;
                                    return;
                                }
                            };
                            let fragment = match filter.as_mut() {
                                Some(filter) => filter.push(&data.text),
                                None => data.text,
                            };
                            if !fragment.is_empty() && tx.send(Ok(fragment)).await.is_err() {
                                debug!("fragment consumer dropped, aborting upstream read");
                                return;
                            }
                        }
                        // An in-place rewrite of the reply cannot be
                        // expressed as an append-only fragment relay. The
                        // compat fallback accepts it as plain text.
                        "replace_response" => {
                            if compat {
                                let data: TextEventData =
                                    serde_json::from_str(&event.data).unwrap_or(TextEventData {
                                        text: String::new(),
                                    });
                                if !data.text.is_empty()
                                    && tx.send(Ok(data.text)).await.is_err()
                                {
                                    return;
                                }
                            } else {
                                let _ = tx
                                    .send(Err(ProxyError::ProtocolMismatch(
                                        "upstream sent replace_response".to_string(),
                                    )))
                                    .await;
                                return;
                            }
                        }
                        "error" => {
                            let data: ErrorEventData =
                                serde_json::from_str(&event.data).unwrap_or(ErrorEventData {
                                    text: "unspecified upstream error".to_string(),
                                    allow_retry: false,
                                });
                            warn!(message = %data.text, allow_retry = data.allow_retry, "upstream error event");
                            let _ = tx
                                .send(Err(ProxyError::Upstream(data.text)))
                                .await;
                            return;
                        }
                        "done" => {
                            if let Some(filter) = filter.as_mut() {
                                let tail = filter.finish();
                                if !tail.is_empty() {
                                    let _ = tx.send(Ok(tail)).await;
                                }
                            }
                            return;
                        }
                        // meta, ping and other bookkeeping events.
                        _ => {}
                    }
                }
            }

            // Body ended without a done event; flush the filter and let the
            // closing channel signal completion.
            if let Some(filter) = filter.as_mut() {
                let tail = filter.finish();
                if !tail.is_empty() {
                    let _ = tx.send(Ok(tail)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
