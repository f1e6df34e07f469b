use std::time::Duration;

use crate::error::ProxyError;

pub const DEFAULT_POE_BASE_URL: &str = "https://api.poe.com/bot";

/// Runtime configuration, assembled from CLI flags and environment
/// variables by the binary. All ask calls fail with an authentication
/// error when the API key is missing, so we validate it up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    /// Base URL for the Poe bot query endpoint. Overridable for tests.
    pub base_url: String,
    /// Strip Claude thinking segments from replies of `is_claude` bots.
    pub claude_compatible: bool,
    /// Timeout applied to every upstream call.
    pub request_timeout: Duration,
    /// Sessions idle longer than this are treated as absent.
    pub session_expiry: Duration,
}

impl Config {
    pub fn new(
        api_key: String,
        claude_compatible: bool,
        timeout_secs: u64,
        session_expiry_mins: u64,
    ) -> Result<Self, ProxyError> {
        if api_key.trim().is_empty() {
            return Err(ProxyError::Auth(
                "POE_API_KEY is required; get one from https://poe.com/api_key".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            base_url: DEFAULT_POE_BASE_URL.to_string(),
            claude_compatible,
            request_timeout: Duration::from_secs(timeout_secs),
            session_expiry: Duration::from_secs(session_expiry_mins * 60),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_an_auth_error() {
        let err = Config::new(String::new(), true, 60, 60).unwrap_err();
        assert_eq!(err.kind(), "authentication_error");
    }

    #[test]
    fn durations_are_derived_from_flags() {
        let config = Config::new("key".into(), false, 30, 10).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.session_expiry, Duration::from_secs(600));
        assert_eq!(config.base_url, DEFAULT_POE_BASE_URL);
    }
}
