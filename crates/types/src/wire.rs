//! Request and response bodies exchanged with the registration backend.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Query parameters of the confirmation check (`GET subscription_confirmed?id=...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationQuery {
    /// Email address whose subscription is checked.
    pub id: String,
}

/// Body returned by the confirmation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    /// True once the user accepted the email subscription.
    pub subscription_confirmed: bool,
}

/// Body of `POST register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Provider attributes of the registering user.
    pub user_attributes: Identity,
    /// Free-text interests entered by the user.
    pub message: String,
}

impl RegistrationRequest {
    /// Creates a request for `identity` carrying `message`.
    #[must_use]
    pub fn new(identity: Identity, message: impl Into<String>) -> Self {
        Self { user_attributes: identity, message: message.into() }
    }
}

/// Acknowledgement returned by the registration endpoint.
///
/// The backend's body is not part of the contract; it is kept verbatim
/// (`Null` for an empty body) for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationAck {
    /// Raw acknowledgement body.
    pub body: serde_json::Value,
}

/// Error body returned by the backend on rejected requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
}
