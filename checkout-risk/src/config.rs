//! Session configuration.
//!
//! Provides the settings shared by every concern created for one checkout
//! session.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.recurly.com/js/v1";

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Configuration for a checkout session.
///
/// # Example
///
/// ```rust
/// use checkout_risk::config::SessionConfig;
///
/// let config: SessionConfig = serde_json::from_value(serde_json::json!({
///     "publicKey": "ewr1-abc",
///     "timeout": 5000,
/// }))
/// .unwrap();
/// assert_eq!(config.api.as_str(), "https://api.recurly.com/js/v1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Public API key identifying the merchant site.
    pub public_key: String,

    /// API base URL.
    #[serde(default = "default_api")]
    pub api: Url,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_api() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API URL is valid")
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl SessionConfig {
    /// Creates a config with the given public key and default endpoint.
    #[must_use]
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            api: default_api(),
            timeout: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api(mut self, api: Url) -> Self {
        self.api = api;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}
