//! Identity fixtures.

use optin_types::Identity;

/// Returns a fully populated identity for `email`.
///
/// The given name is derived from the local part, e.g. `carol@x.com` greets
/// as `Carol`.
#[must_use]
pub fn test_identity(email: &str) -> Identity {
    let local = email.split('@').next().unwrap_or(email);
    let mut chars = local.chars();
    let given_name = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Identity::builder()
        .email(email)
        .given_name(given_name)
        .family_name("Tester")
        .subject(format!("sub-{local}"))
        .email_verified(true)
        .build()
}

/// `alice@example.com`.
#[must_use]
pub fn alice() -> Identity {
    test_identity("alice@example.com")
}

/// `bob@example.com`.
#[must_use]
pub fn bob() -> Identity {
    test_identity("bob@example.com")
}
