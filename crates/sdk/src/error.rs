//! SDK error types.
//!
//! Errors fall into three groups:
//! - **Expected**: `NotAuthenticated`, which callers treat as "no identity"
//! - **Transport**: HTTP failures, undecodable bodies, timeouts. Non-fatal for
//!   the poller; surfaced as `Failed(message)` by the submitter
//! - **Local**: `InvalidInput`, `Busy`, configuration errors. Rejected before
//!   any network I/O

use optin_types::ValidationError;
use snafu::{Location, Snafu};

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK error types with context-rich error messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SdkError {
    /// No user is signed in.
    #[snafu(display("The user is not authenticated"))]
    NotAuthenticated,

    /// The identity provider failed for a reason other than a missing session.
    #[snafu(display("Identity provider error: {message}"))]
    IdentityProvider {
        /// Error description.
        message: String,
    },

    /// The backend answered with a non-success status.
    #[snafu(display("Request failed at {location}: {message}"))]
    Transport {
        /// Error description.
        message: String,
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Raw response body, if one was received.
        payload: Option<String>,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// The HTTP client failed before a response was received.
    #[snafu(display("HTTP error at {location}: {source}"))]
    Http {
        /// Underlying client error.
        source: reqwest::Error,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A response body could not be decoded.
    #[snafu(display("Failed to decode {what}: {source}"))]
    Decode {
        /// Which body was being decoded.
        what: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// Operation timed out.
    #[snafu(display("Operation timed out after {duration_ms}ms"))]
    Timeout {
        /// Timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// The backend rejected a registration.
    #[snafu(display("{message}"))]
    Submission {
        /// Human-readable reason reported by the backend.
        message: String,
    },

    /// A local precondition was violated; nothing was sent.
    #[snafu(display("Invalid input: {field}: {constraint}"))]
    InvalidInput {
        /// The offending field.
        field: String,
        /// The violated constraint.
        constraint: String,
    },

    /// A submission is already in flight.
    #[snafu(display("A submission is already in progress"))]
    Busy,

    /// Configuration validation error.
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// URL validation error.
    #[snafu(display("Invalid URL '{url}': {message}"))]
    InvalidUrl {
        /// The invalid URL.
        url: String,
        /// Parse error description.
        message: String,
    },
}

impl SdkError {
    /// Returns true if the failure is expected to clear on its own, so a
    /// later poll may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Timeout { .. } => true,
            Self::IdentityProvider { .. } => true,
            Self::Transport { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500 || *code == 408 || *code == 429,
            },
            Self::NotAuthenticated => false,
            Self::Decode { .. } => false,
            Self::Submission { .. } => false,
            Self::InvalidInput { .. } => false,
            Self::Busy => false,
            Self::Config { .. } => false,
            Self::InvalidUrl { .. } => false,
        }
    }

    /// Stable label for metrics and logs.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::IdentityProvider { .. } => "identity_provider",
            Self::Transport { .. } => "transport",
            Self::Http { .. } => "http",
            Self::Decode { .. } => "decode",
            Self::Timeout { .. } => "timeout",
            Self::Submission { .. } => "submission",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Busy => "busy",
            Self::Config { .. } => "config",
            Self::InvalidUrl { .. } => "invalid_url",
        }
    }

    /// HTTP status attached to the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Http { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Response payload attached to the error, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Transport { payload, .. } => payload.as_deref(),
            _ => None,
        }
    }

    /// Message suitable for showing to the user after a failed submission.
    ///
    /// Source locations and transport internals are left out.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { message, .. } | Self::Submission { message } => message.clone(),
            Self::Http { source, .. } if source.is_connect() => {
                "Could not reach the registration service".to_string()
            },
            Self::Http { .. } => "Network error while contacting the registration service".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for SdkError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidInput { field: err.field, constraint: err.constraint }
    }
}

impl From<reqwest::Error> for SdkError {
    #[track_caller]
    fn from(source: reqwest::Error) -> Self {
        let loc = std::panic::Location::caller();
        Self::Http { source, location: Location::new(loc.file(), loc.line(), loc.column()) }
    }
}
