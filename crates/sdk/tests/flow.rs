//! End-to-end gate scenarios against the in-memory backend.
//!
//! Timer scenarios run on tokio's paused clock; the property tests step the
//! poller with `poll_once` so every generated answer is observed exactly once.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::{sync::Arc, time::Duration};

use optin_sdk::{
    ConfirmationStatus, FlowEvent, FlowPhase, FlowStateStore, GateSession, SdkError,
    SessionIdentity, SubmissionOutcome, TickOutcome,
    mock::{MockBackend, test_config},
};
use optin_test_utils::{
    alice, bob,
    strategies::{
        PollResponse, arb_blank_message, arb_identity, arb_message, arb_poll_responses,
        arb_same_identity_event,
    },
    test_timing,
};
use proptest::prelude::*;

struct Harness {
    identity: SessionIdentity,
    backend: Arc<MockBackend>,
    gate: GateSession,
}

fn harness() -> Harness {
    let identity = SessionIdentity::new();
    let backend = Arc::new(MockBackend::new());
    let gate = GateSession::builder()
        .config(test_config())
        .identity(Arc::new(identity.clone()))
        .confirmations(backend.clone())
        .registrations(backend.clone())
        .build();
    gate.follow(identity.subscribe());
    Harness { identity, backend, gate }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

async fn settle() {
    advance(Duration::ZERO).await;
}

// ============================================================================
// Timer scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_flow_sign_in_confirm_submit() {
    let h = harness();
    let interval = test_timing().poll_interval;
    h.backend.push_confirmations([false, false, false, true]);

    h.identity.sign_in(alice());
    settle().await;
    assert_eq!(h.gate.state().phase, FlowPhase::PendingConfirmation);

    let mut observed = Vec::new();
    for _ in 0..4 {
        advance(interval).await;
        observed.push(h.gate.state().confirmation);
    }
    assert_eq!(
        observed,
        vec![
            ConfirmationStatus::Pending,
            ConfirmationStatus::Pending,
            ConfirmationStatus::Pending,
            ConfirmationStatus::Confirmed,
        ]
    );
    assert!(!h.gate.is_polling());

    let outcome = h.gate.submit("interested in X").await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Succeeded);

    let sent = h.backend.registrations();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_attributes, alice());
    assert_eq!(sent[0].message, "interested in X");
    assert_eq!(h.gate.state().phase, FlowPhase::Submitted);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_mid_polling_makes_no_further_calls() {
    let h = harness();
    let interval = test_timing().poll_interval;

    h.identity.sign_in(alice());
    settle().await;
    advance(interval).await;
    assert_eq!(h.backend.confirmation_count(), 1);

    h.identity.sign_out();
    settle().await;
    advance(interval * 5).await;

    assert_eq!(h.backend.confirmation_count(), 1);
    let state = h.gate.state();
    assert_eq!(state.confirmation, ConfirmationStatus::Pending);
    assert_eq!(state.phase, FlowPhase::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_switching_user_resets_and_polls_new_email() {
    let h = harness();
    let interval = test_timing().poll_interval;
    h.backend.push_confirmations([true]);

    h.identity.sign_in(alice());
    settle().await;
    advance(interval).await;
    assert_eq!(h.gate.state().phase, FlowPhase::AwaitingSubmission);

    h.identity.sign_in(bob());
    settle().await;
    assert_eq!(h.gate.state().phase, FlowPhase::PendingConfirmation);
    assert!(h.gate.is_polling());

    advance(interval).await;
    assert_eq!(h.backend.confirmation_requests().last().unwrap(), "bob@example.com");
}

#[tokio::test(start_paused = true)]
async fn test_poll_errors_stay_invisible_to_the_user() {
    let h = harness();
    let interval = test_timing().poll_interval;
    h.backend.inject_confirmation_failures(3);
    h.backend.push_confirmations([true]);

    h.identity.sign_in(alice());
    settle().await;
    for _ in 0..3 {
        advance(interval).await;
        let state = h.gate.state();
        assert_eq!(state.phase, FlowPhase::PendingConfirmation);
        assert!(state.error_message().is_none());
    }
    assert_eq!(h.gate.poll_stats().failures, 3);
    assert!(h.gate.last_poll_error().is_some());

    advance(interval).await;
    assert_eq!(h.gate.state().confirmation, ConfirmationStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_then_elapsed_intervals_make_no_calls() {
    let h = harness();
    h.identity.sign_in(alice());
    settle().await;

    h.gate.shutdown();
    advance(test_timing().poll_interval * 20).await;

    assert_eq!(h.backend.confirmation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_submission_failure_then_retry() {
    let h = harness();
    h.backend.push_confirmations([true]);
    h.identity.sign_in(alice());
    settle().await;
    advance(test_timing().poll_interval).await;

    h.backend.inject_registration_failure("Could not save registration");
    let outcome = h.gate.submit("hello").await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Failed { message: "Could not save registration".into() });
    assert_eq!(h.gate.state().phase, FlowPhase::AwaitingSubmission);
    assert_eq!(h.gate.state().error_message(), Some("Could not save registration"));

    let outcome = h.gate.submit("hello").await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Succeeded);
    assert!(h.gate.state().success());
}

#[tokio::test(start_paused = true)]
async fn test_second_submit_while_in_flight_is_busy() {
    let h = Arc::new(harness());
    h.identity.sign_in(alice());
    settle().await;
    h.backend.inject_delay(u64::try_from(test_timing().slow_call.as_millis()).unwrap());

    let first = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.gate.submit("first").await })
    };
    settle().await;
    assert_eq!(h.gate.state().submission, SubmissionOutcome::InFlight);

    assert!(matches!(h.gate.submit("second").await, Err(SdkError::Busy)));
    assert_eq!(first.await.unwrap().unwrap(), SubmissionOutcome::Succeeded);
    assert_eq!(h.backend.registration_count(), 1);
    h.gate.shutdown();
}

#[tokio::test]
async fn test_submit_while_signed_out_is_invalid_input() {
    let h = harness();

    let err = h.gate.submit("hello").await.unwrap_err();

    assert!(matches!(err, SdkError::InvalidInput { .. }));
    assert_eq!(h.backend.registration_count(), 0);
}

// ============================================================================
// Properties
// ============================================================================

// The session is shut down right after the identity is applied, so only the
// explicit `poll_once` calls below reach the backend.

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().start_paused(true).build().unwrap()
}

fn script_next(backend: &MockBackend, response: PollResponse) {
    backend.reset();
    match response {
        PollResponse::NotYet => backend.set_confirmed(false),
        PollResponse::Confirmed => backend.set_confirmed(true),
        PollResponse::Error => backend.inject_confirmation_failures(1),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_confirmed_never_reverts(
        identity in arb_identity(),
        responses in arb_poll_responses(),
    ) {
        runtime().block_on(async {
            let h = harness();
            h.identity.sign_in(identity.clone());
            h.gate.identity_changed(Some(identity));
            h.gate.shutdown();

            let mut confirmed = false;
            for response in responses {
                script_next(&h.backend, response);
                let outcome = h.gate.poll_once().await;
                if confirmed {
                    prop_assert_eq!(outcome, TickOutcome::AlreadyConfirmed);
                }
                confirmed |= response == PollResponse::Confirmed;
                let expected =
                    if confirmed { ConfirmationStatus::Confirmed } else { ConfirmationStatus::Pending };
                prop_assert_eq!(h.gate.state().confirmation, expected);
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_valid_message_sends_exactly_one_request(message in arb_message()) {
        runtime().block_on(async {
            let h = harness();
            h.identity.sign_in(alice());
            h.gate.identity_changed(Some(alice()));
            h.gate.shutdown();

            let outcome = h.gate.submit(&message).await.unwrap();

            prop_assert_eq!(outcome, SubmissionOutcome::Succeeded);
            let sent = h.backend.registrations();
            prop_assert_eq!(sent.len(), 1);
            prop_assert_eq!(&sent[0].message, &message);
            Ok(())
        })?;
    }

    #[test]
    fn prop_blank_message_is_rejected_without_call(message in arb_blank_message()) {
        runtime().block_on(async {
            let h = harness();
            h.gate.identity_changed(Some(alice()));
            h.gate.shutdown();

            let result = h.gate.submit(&message).await;

            prop_assert!(matches!(result, Err(SdkError::InvalidInput { .. })), "expected InvalidInput, got {:?}", result);
            prop_assert_eq!(h.backend.registration_count(), 0);
            Ok(())
        })?;
    }

    #[test]
    fn prop_store_keeps_confirmation_for_same_email(
        events in proptest::collection::vec(arb_same_identity_event(alice().email), 0..48),
    ) {
        let store = FlowStateStore::new();
        store.apply(FlowEvent::IdentityObserved(Some(alice())));
        store.apply(FlowEvent::ConfirmationObserved { email: alice().email, confirmed: true });

        for event in events {
            let state = store.apply(event);
            prop_assert_eq!(state.confirmation, ConfirmationStatus::Confirmed);
            prop_assert!(state.phase != FlowPhase::PendingConfirmation);
        }
    }
}
