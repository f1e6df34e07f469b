//! Upstream client adapter for the Poe bot-query API.

pub mod claude;
pub mod client;
pub mod wire;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::ProxyError;
use crate::session::Turn;

pub use self::client::PoeClient;

/// Protocol variant spoken to the upstream. `Standard` is the full
/// protocol with Claude thinking-segment handling; `Compat` is the
/// degraded mode used for the single fallback retry after a shape
/// mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    Standard,
    Compat,
}

/// One "ask" as seen by the adapter: target bot, the new prompt, and the
/// entire prior conversation.
#[derive(Debug, Clone)]
pub struct BotQuery {
    pub bot: String,
    pub prompt: String,
    pub history: Vec<Turn>,
}

/// A finite, non-restartable sequence of reply fragments. Concatenating
/// the fragments in order reconstructs the full reply; the stream ending
/// is the completion signal.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProxyError>> + Send>>;

#[async_trait]
pub trait BotClient: Send + Sync {
    /// Issues one upstream call and exposes the reply as a fragment
    /// stream. The retry-on-mismatch policy lives in the handler layer,
    /// so each invocation here is exactly one upstream attempt.
    async fn query(&self, query: &BotQuery, mode: ProtocolMode)
        -> Result<FragmentStream, ProxyError>;
}
