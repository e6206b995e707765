//! Authenticated user identity.
//!
//! An [`Identity`] is an immutable snapshot of the attributes the identity
//! provider reports for the signed-in user. Attribute names follow the
//! provider's wire names so the snapshot can be forwarded verbatim as the
//! `userAttributes` object of a registration request.

use serde::{Deserialize, Serialize};

/// Attributes of the signed-in user.
///
/// Two identities denote the same principal iff their emails are equal; the
/// remaining attributes may change between reads (e.g. a profile edit) without
/// invalidating an earlier confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Identity {
    /// Email address; the stable key used for confirmation checks.
    #[builder(into)]
    pub email: String,

    /// First name collected at sign-up.
    #[builder(into, default)]
    #[serde(default)]
    pub given_name: String,

    /// Last name collected at sign-up.
    #[builder(into, default)]
    #[serde(default)]
    pub family_name: String,

    /// Provider subject identifier.
    #[builder(into)]
    #[serde(default, rename = "sub", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Whether the provider has verified the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

impl Identity {
    /// Creates an identity carrying only an email address.
    #[must_use]
    pub fn with_email(email: impl Into<String>) -> Self {
        Self::builder().email(email).build()
    }

    /// Returns true if `other` is the same principal (same email).
    #[must_use]
    pub fn same_principal(&self, other: &Identity) -> bool {
        self.email == other.email
    }

    /// Name to greet the user with, falling back to the email address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.given_name.trim().is_empty() { &self.email } else { &self.given_name }
    }
}
