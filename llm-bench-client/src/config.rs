//! Transport configuration for [`MessagesClient`](crate::MessagesClient).

use std::fmt;
use std::time::Duration;

use crate::error::{InferenceError, InferenceResult};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Connection settings for the Messages endpoint.
///
/// Per-attempt deadlines are enforced by the retrying layer from the
/// experiment configuration; `timeout` here is only the transport-level
/// ceiling for a single HTTP exchange.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL for the API
    pub base_url: String,

    /// Sent as `x-api-key`; omitted when `None`
    pub api_key: Option<String>,

    /// Value of the `anthropic-version` header
    pub api_version: String,

    /// Request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Log request bodies at debug level
    pub enable_logging: bool,

    /// Extra headers added to every request
    pub custom_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("llm-bench/{}", env!("CARGO_PKG_VERSION")),
            enable_logging: false,
            custom_headers: Vec::new(),
        }
    }
}

// api_key stays out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .field("enable_logging", &self.enable_logging)
            .field("custom_headers", &self.custom_headers.len())
            .finish()
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(base_url),
        }
    }

    /// Full URL of an endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> InferenceResult<()> {
        if self.base_url.is_empty() {
            return Err(InferenceError::InvalidRequest(
                "Base URL cannot be empty".to_string(),
            ));
        }

        url::Url::parse(&self.base_url).map_err(|e| {
            InferenceError::InvalidRequest(format!("Invalid base URL {}: {}", self.base_url, e))
        })?;

        if self.timeout.is_zero() {
            return Err(InferenceError::InvalidRequest(
                "Timeout cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn logging(mut self, enable: bool) -> Self {
        self.config.enable_logging = enable;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.custom_headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> InferenceResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
