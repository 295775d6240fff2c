//! Client configuration.
//!
//! Loaded from a TOML file or from environment variables, then validated
//! before a client is built.
//!
//! ```toml
//! base_url = "https://api.eventdesk.example/v1"
//! api_token = "..."
//! timeout_secs = 15
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the API base URL
pub const ENV_API_URL: &str = "EVENTDESK_API_URL";
/// Environment variable holding the bearer token
pub const ENV_API_TOKEN: &str = "EVENTDESK_API_TOKEN";
/// Environment variable holding the request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "EVENTDESK_TIMEOUT_SECS";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("eventdesk-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings for [`crate::HttpResourceClient`]
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.eventdesk.example/v1`
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `User-Agent` header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the base URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Load from `EVENTDESK_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if `EVENTDESK_API_URL` is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(ENV_API_URL)
            .map_err(|_| ConfigError::EnvVarNotSet(ENV_API_URL.to_string()))?;

        let mut config = Self::new(base_url);
        config.api_token = std::env::var(ENV_API_TOKEN).ok().filter(|t| !t.is_empty());

        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            config.timeout_secs = raw.parse().map_err(|e| {
                ConfigError::ParseError(format!("{ENV_TIMEOUT_SECS}={raw}: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or fails validation.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is not http(s) or the timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got {}",
                self.base_url
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL without a trailing slash
    #[must_use]
    pub fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_defaults() {
        let config = ClientConfig::from_toml_str(r#"base_url = "https://api.example.com/v1/""#).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert!(config.api_token.is_none());
        assert_eq!(config.root(), "https://api.example.com/v1");
        assert!(config.user_agent.starts_with("eventdesk-client/"));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let err = ClientConfig::from_toml_str(r#"base_url = "ftp://example.com""#).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = ClientConfig::from_toml_str(
            "base_url = \"https://example.com\"\ntimeout_secs = 0",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = ClientConfig::from_toml_str("base_url = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("https://example.com").with_token("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
