//! Flow state and its reducer.
//!
//! The flow is a composite of three independent inputs:
//!
//! - the current [`Identity`] (or none when signed out),
//! - the [`ConfirmationStatus`] advanced by confirmation polling,
//! - the [`SubmissionOutcome`] advanced by registration submission.
//!
//! [`FlowInputs::apply`] is the single reducer for all [`FlowEvent`]s and
//! [`FlowState::derive`] turns the inputs into the view-state a UI renders.
//! Both are pure, so the whole state machine can be exercised without timers
//! or a runtime.
//!
//! ```text
//! ┌─────────────────┐ identity appears ┌──────────────────────┐
//! │ Unauthenticated │ ───────────────▶ │ PendingConfirmation  │
//! └─────────────────┘                  └──────────────────────┘
//!         ▲                                       │ confirmed = true
//!         │ identity disappears                   ▼
//!         │ (from any phase)          ┌──────────────────────┐ failure
//!         │                           │ AwaitingSubmission   │ ◀──────┐
//!         │                           └──────────────────────┘        │
//!         │                                       │ submit            │
//!         │                                       ▼                   │
//!         │                           ┌──────────────────────┐        │
//!         │                           │ Submitting           │ ───────┘
//!         │                           └──────────────────────┘
//!         │                                       │ success
//!         │                                       ▼
//!         │                           ┌──────────────────────┐
//!         └────────────────────────── │ Submitted            │
//!                                     └──────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Whether the out-of-band email confirmation has been observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// No confirmation observed for the current identity yet.
    #[default]
    Pending,
    /// Confirmation observed. Never reverts while the identity is unchanged.
    Confirmed,
}

impl ConfirmationStatus {
    /// Returns true once confirmation has been observed.
    #[must_use]
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Result of the most recent user-triggered registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Nothing submitted in this session.
    #[default]
    Idle,
    /// A registration call is outstanding.
    InFlight,
    /// The last registration was accepted.
    Succeeded,
    /// The last registration failed; the user may retry.
    Failed {
        /// Human-readable failure description.
        message: String,
    },
}

impl SubmissionOutcome {
    /// Returns true while a registration call is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight)
    }
}

/// Coarse phase of the whole flow, derived from [`FlowInputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    /// Nobody is signed in.
    Unauthenticated,
    /// Signed in, waiting for the user to accept the email subscription.
    PendingConfirmation,
    /// Confirmed; the registration form is available.
    AwaitingSubmission,
    /// A registration is in flight.
    Submitting,
    /// The last registration succeeded. Further submissions are allowed.
    Submitted,
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::PendingConfirmation => "pending_confirmation",
            Self::AwaitingSubmission => "awaiting_submission",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
        };
        f.write_str(name)
    }
}

/// Discrete inputs to the flow reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// The identity provider reported the current identity (`None` when signed out).
    IdentityObserved(Option<Identity>),
    /// A confirmation check for `email` completed.
    ConfirmationObserved {
        /// Email the check was issued for.
        email: String,
        /// Whether the subscription is confirmed.
        confirmed: bool,
    },
    /// A registration call was started.
    SubmissionStarted,
    /// The registration call succeeded.
    SubmissionSucceeded,
    /// The registration call failed.
    SubmissionFailed {
        /// Human-readable failure description.
        message: String,
    },
}

/// The three independent inputs the flow state is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowInputs {
    /// Current identity, if signed in.
    pub identity: Option<Identity>,
    /// Confirmation status of the current identity.
    pub confirmation: ConfirmationStatus,
    /// Outcome of the most recent submission.
    pub submission: SubmissionOutcome,
}

impl FlowInputs {
    /// Applies one event and reports whether anything changed.
    ///
    /// Rules:
    /// - Identity disappearing resets everything to the initial inputs.
    /// - A different email resets confirmation and submission.
    /// - The same email only refreshes the identity attributes.
    /// - A confirmation result only applies to the current email, and only
    ///   ever moves `Pending` to `Confirmed`.
    /// - Submission events are ignored while signed out.
    pub fn apply(&mut self, event: FlowEvent) -> bool {
        let before = self.clone();
        match event {
            FlowEvent::IdentityObserved(None) => {
                *self = Self::default();
            },
            FlowEvent::IdentityObserved(Some(identity)) => {
                let same = self.identity.as_ref().is_some_and(|c| c.same_principal(&identity));
                if !same {
                    self.confirmation = ConfirmationStatus::Pending;
                    self.submission = SubmissionOutcome::Idle;
                }
                self.identity = Some(identity);
            },
            FlowEvent::ConfirmationObserved { email, confirmed } => {
                let current = self.identity.as_ref().is_some_and(|i| i.email == email);
                if current && confirmed {
                    self.confirmation = ConfirmationStatus::Confirmed;
                }
            },
            FlowEvent::SubmissionStarted
            | FlowEvent::SubmissionSucceeded
            | FlowEvent::SubmissionFailed { .. }
                if self.identity.is_none() => {},
            FlowEvent::SubmissionStarted => {
                self.submission = SubmissionOutcome::InFlight;
            },
            FlowEvent::SubmissionSucceeded => {
                self.submission = SubmissionOutcome::Succeeded;
            },
            FlowEvent::SubmissionFailed { message } => {
                self.submission = SubmissionOutcome::Failed { message };
            },
        }
        *self != before
    }

    /// Derives the view-state for these inputs.
    #[must_use]
    pub fn state(&self) -> FlowState {
        FlowState::derive(self.identity.clone(), self.confirmation, self.submission.clone())
    }
}

/// View-state read by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// Current identity, if signed in.
    pub identity: Option<Identity>,
    /// Confirmation status of the current identity.
    pub confirmation: ConfirmationStatus,
    /// Outcome of the most recent submission.
    pub submission: SubmissionOutcome,
    /// Phase derived from the three fields above.
    pub phase: FlowPhase,
}

impl Default for FlowState {
    fn default() -> Self {
        FlowInputs::default().state()
    }
}

impl FlowState {
    /// Derives the flow state from its inputs. Deterministic and side-effect free.
    #[must_use]
    pub fn derive(
        identity: Option<Identity>,
        confirmation: ConfirmationStatus,
        submission: SubmissionOutcome,
    ) -> Self {
        let phase = match (&identity, confirmation, &submission) {
            (None, _, _) => FlowPhase::Unauthenticated,
            (Some(_), ConfirmationStatus::Pending, _) => FlowPhase::PendingConfirmation,
            (Some(_), ConfirmationStatus::Confirmed, SubmissionOutcome::InFlight) => {
                FlowPhase::Submitting
            },
            (Some(_), ConfirmationStatus::Confirmed, SubmissionOutcome::Succeeded) => {
                FlowPhase::Submitted
            },
            (Some(_), ConfirmationStatus::Confirmed, _) => FlowPhase::AwaitingSubmission,
        };
        Self { identity, confirmation, submission, phase }
    }

    /// Whether the registration form may be submitted right now.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        matches!(self.phase, FlowPhase::AwaitingSubmission | FlowPhase::Submitted)
    }

    /// Name to greet the signed-in user with.
    #[must_use]
    pub fn greeting_name(&self) -> Option<&str> {
        self.identity.as_ref().map(Identity::display_name)
    }

    /// Failure message of the last submission, if it failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.submission {
            SubmissionOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }

    /// Whether the last submission succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.submission, SubmissionOutcome::Succeeded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn alice() -> Identity {
        Identity::builder().email("a@x.com").given_name("Alice").build()
    }

    fn confirmed_alice() -> FlowInputs {
        let mut inputs = FlowInputs::default();
        inputs.apply(FlowEvent::IdentityObserved(Some(alice())));
        inputs.apply(FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: true });
        inputs
    }

    #[test]
    fn test_initial_state_is_unauthenticated() {
        let state = FlowState::default();
        assert_eq!(state.phase, FlowPhase::Unauthenticated);
        assert_eq!(state.confirmation, ConfirmationStatus::Pending);
        assert_eq!(state.submission, SubmissionOutcome::Idle);
        assert!(state.identity.is_none());
        assert!(!state.can_submit());
    }

    #[test]
    fn test_identity_appearing_enters_pending_confirmation() {
        let mut inputs = FlowInputs::default();
        assert!(inputs.apply(FlowEvent::IdentityObserved(Some(alice()))));
        assert_eq!(inputs.state().phase, FlowPhase::PendingConfirmation);
        assert_eq!(inputs.state().greeting_name(), Some("Alice"));
    }

    #[test]
    fn test_confirmation_enters_awaiting_submission() {
        let inputs = confirmed_alice();
        let state = inputs.state();
        assert_eq!(state.phase, FlowPhase::AwaitingSubmission);
        assert!(state.can_submit());
    }

    #[test]
    fn test_confirmation_false_changes_nothing() {
        let mut inputs = FlowInputs::default();
        inputs.apply(FlowEvent::IdentityObserved(Some(alice())));
        let changed = inputs
            .apply(FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: false });
        assert!(!changed);
        assert_eq!(inputs.confirmation, ConfirmationStatus::Pending);
    }

    #[test]
    fn test_confirmation_without_identity_is_ignored() {
        let mut inputs = FlowInputs::default();
        let changed = inputs
            .apply(FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: true });
        assert!(!changed);
        assert_eq!(inputs.confirmation, ConfirmationStatus::Pending);
    }

    #[test]
    fn test_stale_confirmation_for_previous_email_is_ignored() {
        let mut inputs = FlowInputs::default();
        inputs.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("b@x.com"))));
        inputs.apply(FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: true });
        assert_eq!(inputs.confirmation, ConfirmationStatus::Pending);
    }

    #[test]
    fn test_email_change_resets_confirmation_and_submission() {
        let mut inputs = confirmed_alice();
        inputs.apply(FlowEvent::SubmissionSucceeded);

        inputs.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("b@x.com"))));

        assert_eq!(inputs.confirmation, ConfirmationStatus::Pending);
        assert_eq!(inputs.submission, SubmissionOutcome::Idle);
        assert_eq!(inputs.state().phase, FlowPhase::PendingConfirmation);
    }

    #[test]
    fn test_same_email_keeps_confirmation_and_refreshes_attributes() {
        let mut inputs = confirmed_alice();
        let renamed = Identity::builder().email("a@x.com").given_name("Ally").build();

        inputs.apply(FlowEvent::IdentityObserved(Some(renamed)));

        assert_eq!(inputs.confirmation, ConfirmationStatus::Confirmed);
        assert_eq!(inputs.state().greeting_name(), Some("Ally"));
    }

    #[test]
    fn test_sign_out_resets_everything() {
        let mut inputs = confirmed_alice();
        inputs.apply(FlowEvent::SubmissionFailed { message: "boom".into() });

        assert!(inputs.apply(FlowEvent::IdentityObserved(None)));

        assert_eq!(inputs, FlowInputs::default());
        assert_eq!(inputs.state().phase, FlowPhase::Unauthenticated);
    }

    #[test]
    fn test_repeated_sign_out_is_a_no_op() {
        let mut inputs = FlowInputs::default();
        assert!(!inputs.apply(FlowEvent::IdentityObserved(None)));
    }

    #[test]
    fn test_submission_lifecycle_phases() {
        let mut inputs = confirmed_alice();

        inputs.apply(FlowEvent::SubmissionStarted);
        assert_eq!(inputs.state().phase, FlowPhase::Submitting);
        assert!(!inputs.state().can_submit());

        inputs.apply(FlowEvent::SubmissionFailed { message: "network down".into() });
        let state = inputs.state();
        assert_eq!(state.phase, FlowPhase::AwaitingSubmission);
        assert_eq!(state.error_message(), Some("network down"));

        inputs.apply(FlowEvent::SubmissionStarted);
        inputs.apply(FlowEvent::SubmissionSucceeded);
        let state = inputs.state();
        assert_eq!(state.phase, FlowPhase::Submitted);
        assert!(state.success());
        assert!(state.error_message().is_none());
        assert!(state.can_submit());
    }

    #[test]
    fn test_submission_events_ignored_while_signed_out() {
        let mut inputs = FlowInputs::default();
        assert!(!inputs.apply(FlowEvent::SubmissionStarted));
        assert!(!inputs.apply(FlowEvent::SubmissionFailed { message: "late".into() }));
        assert_eq!(inputs, FlowInputs::default());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = FlowState::derive(
            Some(alice()),
            ConfirmationStatus::Confirmed,
            SubmissionOutcome::Failed { message: "x".into() },
        );
        let b = FlowState::derive(
            Some(alice()),
            ConfirmationStatus::Confirmed,
            SubmissionOutcome::Failed { message: "x".into() },
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_submission_outcome_serializes_tagged() {
        let json = serde_json::to_value(SubmissionOutcome::Failed { message: "x".into() }).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["message"], "x");
    }

    fn arb_poll_event() -> impl Strategy<Value = FlowEvent> {
        prop_oneof![
            any::<bool>().prop_map(|confirmed| FlowEvent::ConfirmationObserved {
                email: "a@x.com".into(),
                confirmed,
            }),
            Just(FlowEvent::ConfirmationObserved { email: "z@x.com".into(), confirmed: false }),
            Just(FlowEvent::SubmissionStarted),
            Just(FlowEvent::SubmissionSucceeded),
            "[a-z ]{0,12}".prop_map(|message| FlowEvent::SubmissionFailed { message }),
            Just(FlowEvent::IdentityObserved(Some(Identity::with_email("a@x.com")))),
        ]
    }

    proptest! {
        #[test]
        fn prop_confirmed_is_monotonic_without_identity_change(
            events in proptest::collection::vec(arb_poll_event(), 0..64)
        ) {
            let mut inputs = confirmed_alice();
            for event in events {
                inputs.apply(event);
                prop_assert_eq!(inputs.confirmation, ConfirmationStatus::Confirmed);
            }
        }

        #[test]
        fn prop_state_is_function_of_inputs(
            events in proptest::collection::vec(arb_poll_event(), 0..32)
        ) {
            let mut inputs = FlowInputs::default();
            inputs.apply(FlowEvent::IdentityObserved(Some(alice())));
            for event in events {
                inputs.apply(event);
            }
            let derived = FlowState::derive(
                inputs.identity.clone(),
                inputs.confirmation,
                inputs.submission.clone(),
            );
            prop_assert_eq!(inputs.state(), derived);
        }
    }
}
