//! Flow state store.
//!
//! The store is the only mutation point for the flow. It serializes every
//! [`FlowEvent`] behind one lock, runs the pure reducer from `optin-types`, and
//! publishes each resulting [`FlowState`] on a watch channel for the UI.
//!
//! The poller and the submitter complete on independent tasks; their events
//! may interleave in any order, but each is applied atomically.

use optin_types::{FlowEvent, FlowInputs, FlowState};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Single source of truth for the flow.
#[derive(Debug)]
pub struct FlowStateStore {
    inputs: Mutex<FlowInputs>,
    published: watch::Sender<FlowState>,
}

impl Default for FlowStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowStateStore {
    /// Creates a store in the initial state (signed out, pending, idle).
    #[must_use]
    pub fn new() -> Self {
        let (published, _) = watch::channel(FlowState::default());
        Self { inputs: Mutex::new(FlowInputs::default()), published }
    }

    /// Applies an event and returns the resulting state.
    pub fn apply(&self, event: FlowEvent) -> FlowState {
        let mut inputs = self.inputs.lock();
        self.apply_locked(&mut inputs, event)
    }

    /// Applies an event unless `token` has been cancelled.
    ///
    /// The check and the mutation happen under the store lock, so an event
    /// gated on a token can never land after [`cancel`](Self::cancel) for that
    /// token has returned. Returns `None` if the event was discarded.
    pub fn apply_unless_cancelled(
        &self,
        token: &CancellationToken,
        event: FlowEvent,
    ) -> Option<FlowState> {
        let mut inputs = self.inputs.lock();
        if token.is_cancelled() {
            debug!(?event, "Discarding event from cancelled task");
            return None;
        }
        Some(self.apply_locked(&mut inputs, event))
    }

    /// Cancels `token` while holding the store lock.
    ///
    /// Pairs with [`apply_unless_cancelled`](Self::apply_unless_cancelled).
    pub fn cancel(&self, token: &CancellationToken) {
        let _inputs = self.inputs.lock();
        token.cancel();
    }

    fn apply_locked(&self, inputs: &mut FlowInputs, event: FlowEvent) -> FlowState {
        if inputs.apply(event) {
            let state = inputs.state();
            debug!(phase = %state.phase, confirmation = %state.confirmation, "Flow state changed");
            self.published.send_replace(state.clone());
            state
        } else {
            inputs.state()
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.inputs.lock().state()
    }

    /// Returns a copy of the current inputs.
    #[must_use]
    pub fn inputs(&self) -> FlowInputs {
        self.inputs.lock().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.published.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use optin_types::{ConfirmationStatus, FlowPhase, Identity};

    use super::*;

    #[test]
    fn test_apply_returns_derived_state() {
        let store = FlowStateStore::new();
        let state = store.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("a@x.com"))));
        assert_eq!(state.phase, FlowPhase::PendingConfirmation);
        assert_eq!(store.state(), state);
    }

    #[test]
    fn test_cancelled_token_discards_event() {
        let store = FlowStateStore::new();
        store.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("a@x.com"))));

        let token = CancellationToken::new();
        store.cancel(&token);

        let applied = store.apply_unless_cancelled(
            &token,
            FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: true },
        );
        assert!(applied.is_none());
        assert_eq!(store.inputs().confirmation, ConfirmationStatus::Pending);
    }

    #[test]
    fn test_live_token_applies_event() {
        let store = FlowStateStore::new();
        store.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("a@x.com"))));

        let token = CancellationToken::new();
        let state = store
            .apply_unless_cancelled(
                &token,
                FlowEvent::ConfirmationObserved { email: "a@x.com".into(), confirmed: true },
            )
            .unwrap();
        assert_eq!(state.confirmation, ConfirmationStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let store = FlowStateStore::new();
        let mut rx = store.subscribe();

        store.apply(FlowEvent::IdentityObserved(None));
        assert!(!rx.has_changed().unwrap());

        store.apply(FlowEvent::IdentityObserved(Some(Identity::with_email("a@x.com"))));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, FlowPhase::PendingConfirmation);
    }
}
