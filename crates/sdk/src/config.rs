//! Client configuration.
//!
//! [`ClientConfig`] is built either through the validating builder or by
//! deserializing an already-loaded configuration document and calling
//! [`ClientConfig::validate`]. Durations use humantime notation (`"2s"`,
//! `"500ms"`) when deserialized.

use std::time::Duration;

use optin_types::DEFAULT_MAX_MESSAGE_BYTES;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{ConfigSnafu, InvalidUrlSnafu, Result};

/// Default confirmation poll interval (2 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default per-request timeout (10 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default path of the registration endpoint.
const DEFAULT_REGISTER_PATH: &str = "register";

/// Default path of the confirmation check endpoint.
const DEFAULT_CONFIRMATION_PATH: &str = "subscription_confirmed";

/// Configuration for the opt-in gate client.
///
/// # Example
///
/// ```no_run
/// # use optin_sdk::ClientConfig;
/// # use std::time::Duration;
/// let config = ClientConfig::builder()
///     .base_url("https://api.example.com/Prod")
///     .poll_interval(Duration::from_secs(2))
///     .build()
///     .expect("valid config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API (no trailing slash required).
    base_url: String,

    /// Interval between confirmation checks.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    poll_interval: Duration,

    /// Timeout applied to every identity read and backend call.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    request_timeout: Duration,

    /// Connection establishment timeout for the HTTP client.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,

    /// Path of the registration endpoint, relative to `base_url`.
    #[serde(default = "default_register_path")]
    register_path: String,

    /// Path of the confirmation check endpoint, relative to `base_url`.
    #[serde(default = "default_confirmation_path")]
    confirmation_path: String,

    /// Maximum registration message length in bytes.
    #[serde(default = "default_max_message_bytes")]
    max_message_bytes: usize,
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_register_path() -> String {
    DEFAULT_REGISTER_PATH.to_string()
}

fn default_confirmation_path() -> String {
    DEFAULT_CONFIRMATION_PATH.to_string()
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

#[bon::bon]
impl ClientConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `base_url` is not an HTTP(S) URL with a host
    /// - `poll_interval`, `request_timeout` or `connect_timeout` is zero
    /// - an endpoint path is empty
    /// - `max_message_bytes` is zero
    #[builder]
    pub fn new(
        #[builder(into)] base_url: String,
        #[builder(default = DEFAULT_POLL_INTERVAL)] poll_interval: Duration,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(into, default = DEFAULT_REGISTER_PATH.to_string())] register_path: String,
        #[builder(into, default = DEFAULT_CONFIRMATION_PATH.to_string())]
        confirmation_path: String,
        #[builder(default = DEFAULT_MAX_MESSAGE_BYTES)] max_message_bytes: usize,
    ) -> Result<Self> {
        let config = Self {
            base_url,
            poll_interval,
            request_timeout,
            connect_timeout,
            register_path,
            confirmation_path,
            max_message_bytes,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ClientConfig {
    /// Validates a configuration obtained by deserialization.
    ///
    /// # Errors
    ///
    /// Same conditions as the builder.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.base_url)?;
        ensure!(!self.poll_interval.is_zero(), ConfigSnafu { message: "poll_interval cannot be zero" });
        ensure!(
            !self.request_timeout.is_zero(),
            ConfigSnafu { message: "request_timeout cannot be zero" }
        );
        ensure!(
            !self.connect_timeout.is_zero(),
            ConfigSnafu { message: "connect_timeout cannot be zero" }
        );
        ensure!(
            !self.register_path.trim_matches('/').is_empty(),
            ConfigSnafu { message: "register_path cannot be empty" }
        );
        ensure!(
            !self.confirmation_path.trim_matches('/').is_empty(),
            ConfigSnafu { message: "confirmation_path cannot be empty" }
        );
        ensure!(
            self.max_message_bytes > 0,
            ConfigSnafu { message: "max_message_bytes must be positive" }
        );
        Ok(())
    }

    /// Returns the backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the confirmation poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the maximum registration message length in bytes.
    #[must_use]
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Full URL of the registration endpoint.
    #[must_use]
    pub fn register_url(&self) -> String {
        join_url(&self.base_url, &self.register_path)
    }

    /// Full URL of the confirmation check endpoint.
    #[must_use]
    pub fn confirmation_url(&self) -> String {
        join_url(&self.base_url, &self.confirmation_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Validates that a URL is well-formed HTTP(S).
fn validate_url(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("http://").or_else(|| url.strip_prefix("https://")) else {
        return InvalidUrlSnafu { url, message: "URL must start with http:// or https://" }.fail();
    };

    if rest.is_empty() || rest.starts_with('/') {
        return InvalidUrlSnafu { url, message: "URL must have a host" }.fail();
    }

    if rest.contains(char::is_whitespace) {
        return InvalidUrlSnafu { url, message: "URL cannot contain whitespace" }.fail();
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::SdkError;

    #[test]
    fn test_builder_defaults() {
        let config = ClientConfig::builder().base_url("https://api.example.com/Prod").build().unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_message_bytes(), DEFAULT_MAX_MESSAGE_BYTES);
    }

    #[test]
    fn test_endpoint_urls_join_cleanly() {
        let config =
            ClientConfig::builder().base_url("https://api.example.com/Prod/").build().unwrap();

        assert_eq!(config.register_url(), "https://api.example.com/Prod/register");
        assert_eq!(
            config.confirmation_url(),
            "https://api.example.com/Prod/subscription_confirmed"
        );
    }

    #[test]
    fn test_custom_paths() {
        let config = ClientConfig::builder()
            .base_url("http://localhost:3000")
            .register_path("/v2/register")
            .confirmation_path("v2/confirmed")
            .build()
            .unwrap();

        assert_eq!(config.register_url(), "http://localhost:3000/v2/register");
        assert_eq!(config.confirmation_url(), "http://localhost:3000/v2/confirmed");
    }

    #[test]
    fn test_invalid_scheme_rejected() {
        let err = ClientConfig::builder().base_url("ftp://example.com").build().unwrap_err();
        assert!(matches!(err, SdkError::InvalidUrl { .. }));
    }

    #[test]
    fn test_missing_host_rejected() {
        let err = ClientConfig::builder().base_url("https://").build().unwrap_err();
        assert!(err.to_string().contains("must have a host"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = ClientConfig::builder()
            .base_url("https://api.example.com")
            .poll_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, SdkError::Config { .. }));
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ClientConfig::builder()
            .base_url("https://api.example.com")
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = ClientConfig::builder()
            .base_url("https://api.example.com")
            .register_path("/")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("register_path"));
    }

    #[test]
    fn test_deserialize_with_humantime_and_defaults() {
        let json = r#"{"base_url":"https://api.example.com/Prod","poll_interval":"500ms"}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.register_url(), "https://api.example.com/Prod/register");
    }

    #[test]
    fn test_deserialized_config_still_validated() {
        let json = r#"{"base_url":"api.example.com"}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }
}
