//! Proptest strategies for opt-in gate types.
//!
//! Generators for identities, backend answers and registration messages,
//! shared by the property tests of every crate.
//!
//! # Usage
//!
//! ```no_run
//! use optin_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(answers in strategies::arb_poll_responses()) {
//!         // drive a poller with the generated answers
//!     }
//! }
//! ```

use optin_types::{FlowEvent, Identity};
use proptest::prelude::*;

/// A backend answer to one confirmation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResponse {
    /// `{ "subscription_confirmed": false }`.
    NotYet,
    /// `{ "subscription_confirmed": true }`.
    Confirmed,
    /// Transport failure.
    Error,
}

/// Generates an email address `[a-z][a-z0-9]{0,11}@[a-z]{1,8}.(com|org|net)`.
pub fn arb_email() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9]{0,11}", "[a-z]{1,8}", prop::sample::select(vec!["com", "org", "net"]))
        .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
}

/// Generates an [`Identity`] with random names and optional provider attributes.
pub fn arb_identity() -> impl Strategy<Value = Identity> {
    (
        arb_email(),
        "[A-Z][a-z]{0,9}",
        "[A-Z][a-z]{0,11}",
        proptest::option::of("[a-f0-9]{8}"),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(email, given_name, family_name, subject, email_verified)| Identity {
            email,
            given_name,
            family_name,
            subject,
            email_verified,
        })
}

/// Generates one confirmation answer, weighted towards "not yet".
pub fn arb_poll_response() -> impl Strategy<Value = PollResponse> {
    prop_oneof![
        6 => Just(PollResponse::NotYet),
        2 => Just(PollResponse::Error),
        1 => Just(PollResponse::Confirmed),
    ]
}

/// Generates 1-32 confirmation answers.
pub fn arb_poll_responses() -> impl Strategy<Value = Vec<PollResponse>> {
    proptest::collection::vec(arb_poll_response(), 1..32)
}

/// Generates a valid registration message of 1-200 printable characters.
pub fn arb_message() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 .,!?]{0,199}"
}

/// Generates a message that is empty after trimming.
pub fn arb_blank_message() -> impl Strategy<Value = String> {
    "[ \t\n]{0,8}"
}

/// Generates reducer events for `email` that never change the identity.
pub fn arb_same_identity_event(email: String) -> impl Strategy<Value = FlowEvent> {
    let confirmed_email = email.clone();
    let identity_email = email;
    prop_oneof![
        any::<bool>().prop_map(move |confirmed| FlowEvent::ConfirmationObserved {
            email: confirmed_email.clone(),
            confirmed,
        }),
        Just(FlowEvent::SubmissionStarted),
        Just(FlowEvent::SubmissionSucceeded),
        "[a-z ]{1,16}".prop_map(|message| FlowEvent::SubmissionFailed { message }),
        "[A-Z][a-z]{0,9}".prop_map(move |given_name| {
            FlowEvent::IdentityObserved(Some(
                Identity::builder().email(identity_email.clone()).given_name(given_name).build(),
            ))
        }),
    ]
}
