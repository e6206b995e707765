//! Backend clients for the confirmation check and registration endpoints.
//!
//! The poller and submitter depend only on the [`ConfirmationClient`] and
//! [`RegistrationClient`] traits. [`HttpBackend`] implements both over HTTP;
//! [`MockBackend`](crate::mock::MockBackend) implements both in memory.

use async_trait::async_trait;
use optin_types::{
    ConfirmationQuery, ConfirmationResponse, ErrorBody, RegistrationAck, RegistrationRequest,
};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    config::ClientConfig,
    error::{DecodeSnafu, Result, TransportSnafu},
};

/// Read-only confirmation check.
#[async_trait]
pub trait ConfirmationClient: Send + Sync + 'static {
    /// Returns whether the subscription for `email` has been confirmed.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the backend cannot be reached or
    /// answers with a non-success status.
    async fn subscription_confirmed(&self, email: &str) -> Result<bool>;
}

/// Registration write.
#[async_trait]
pub trait RegistrationClient: Send + Sync + 'static {
    /// Persists a registration request.
    ///
    /// # Errors
    ///
    /// Returns an error carrying a human-readable message if the backend
    /// rejects or fails the request.
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationAck>;
}

/// HTTP implementation of both backend clients.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    register_url: String,
    confirmation_url: String,
}

impl HttpBackend {
    /// Creates a backend client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(http, config))
    }

    /// Creates a backend client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            register_url: config.register_url(),
            confirmation_url: config.confirmation_url(),
        }
    }
}

/// Turns a non-success response into a transport error carrying its body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let payload = response.text().await.ok().filter(|body| !body.is_empty());
    let message = payload
        .as_deref()
        .and_then(|body| serde_json::from_str::<ErrorBody>(body).ok())
        .map(|body| body.message)
        .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));

    TransportSnafu { message, status: Some(status.as_u16()), payload }.fail()
}

#[async_trait]
impl ConfirmationClient for HttpBackend {
    async fn subscription_confirmed(&self, email: &str) -> Result<bool> {
        debug!(email, url = %self.confirmation_url, "Checking subscription confirmation");

        let query = ConfirmationQuery { id: email.to_string() };
        let response = self.http.get(&self.confirmation_url).query(&query).send().await?;
        let body = check_status(response).await?.bytes().await?;

        let parsed: ConfirmationResponse =
            serde_json::from_slice(&body).context(DecodeSnafu { what: "confirmation response" })?;
        Ok(parsed.subscription_confirmed)
    }
}

#[async_trait]
impl RegistrationClient for HttpBackend {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationAck> {
        debug!(email = %request.user_attributes.email, url = %self.register_url, "Submitting registration");

        let response = self.http.post(&self.register_url).json(request).send().await?;
        let body = check_status(response).await?.bytes().await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RegistrationAck::default());
        }
        let ack = serde_json::from_slice(&body).context(DecodeSnafu { what: "registration ack" })?;
        Ok(ack)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_uses_configured_urls() {
        let config = ClientConfig::builder()
            .base_url("https://api.example.com/Prod")
            .build()
            .unwrap();
        let backend = HttpBackend::new(&config).unwrap();

        assert_eq!(backend.register_url, "https://api.example.com/Prod/register");
        assert_eq!(backend.confirmation_url, "https://api.example.com/Prod/subscription_confirmed");
    }
}
