use thiserror::Error;

/// Error taxonomy for the proxy. Every variant carries a human-readable
/// message; `kind()` is the stable machine-readable tag used in JSON error
/// envelopes.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Bad or missing input, rejected before any upstream I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Bot name not present in the model catalog.
    #[error("unknown model: {0}")]
    InvalidModel(String),

    /// Upstream rejected our credentials. Fatal, never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Upstream network/timeout failure or upstream-reported error.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// The upstream reply used a response shape we cannot relay in the
    /// current protocol mode. Triggers a single compat-mode retry when it
    /// occurs before any fragment was emitted.
    #[error("upstream protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The downstream client went away mid-stream. Internal only; never
    /// serialized into a response.
    #[error("client disconnected")]
    Canceled,
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::InvalidModel(_) => "invalid_model",
            ProxyError::Auth(_) => "authentication_error",
            ProxyError::Upstream(_) => "upstream_unavailable",
            ProxyError::ProtocolMismatch(_) => "protocol_mismatch",
            ProxyError::Canceled => "canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            ProxyError::InvalidRequest("x".into()).kind(),
            "invalid_request"
        );
        assert_eq!(ProxyError::Auth("x".into()).kind(), "authentication_error");
        assert_eq!(
            ProxyError::Upstream("x".into()).kind(),
            "upstream_unavailable"
        );
    }

    #[test]
    fn messages_include_detail() {
        let err = ProxyError::InvalidModel("NoSuchBot".into());
        assert!(err.to_string().contains("NoSuchBot"));
    }
}
