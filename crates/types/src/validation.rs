//! Input validation for registration submissions.
//!
//! Checks run client-side before anything is sent over the network. The
//! message limit is configurable because the backend stores the text as an
//! opaque attribute and feeds it to downstream processing.

use std::fmt;

use crate::identity::Identity;

/// Default upper bound on the registration message, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

/// Validation error with structured context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    fn new(field: &str, constraint: impl Into<String>) -> Self {
        Self { field: field.to_string(), constraint: constraint.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates the free-text registration message.
///
/// The message must contain at least one non-whitespace character and must
/// not exceed `max_bytes` in UTF-8 length.
///
/// # Errors
///
/// Returns [`ValidationError`] for an empty/blank or oversized message.
pub fn validate_message(message: &str, max_bytes: usize) -> Result<(), ValidationError> {
    if message.trim().is_empty() {
        return Err(ValidationError::new("message", "must not be empty"));
    }
    if message.len() > max_bytes {
        return Err(ValidationError::new(
            "message",
            format!("length {} bytes exceeds maximum {} bytes", message.len(), max_bytes),
        ));
    }
    Ok(())
}

/// Validates the email address used as the confirmation key.
///
/// This is a shape check only (`local@domain`, no whitespace); deliverability
/// is the identity provider's concern.
///
/// # Errors
///
/// Returns [`ValidationError`] if the address is empty or malformed.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new("email", "must not be empty"));
    }
    if email.contains(char::is_whitespace) {
        return Err(ValidationError::new("email", "must not contain whitespace"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        },
        _ => Err(ValidationError::new("email", "must have the form local@domain")),
    }
}

/// Validates a complete submission: a signed-in identity and a message.
///
/// # Errors
///
/// Returns [`ValidationError`] with field `identity` when nobody is signed
/// in, otherwise the first failing email or message check.
pub fn validate_submission<'a>(
    identity: Option<&'a Identity>,
    message: &str,
    max_message_bytes: usize,
) -> Result<&'a Identity, ValidationError> {
    let identity =
        identity.ok_or_else(|| ValidationError::new("identity", "user is not signed in"))?;
    validate_email(&identity.email)?;
    validate_message(message, max_message_bytes)?;
    Ok(identity)
}
