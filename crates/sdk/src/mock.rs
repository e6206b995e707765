//! In-memory backend for testing the gate without a server.
//!
//! [`MockBackend`] implements both [`ConfirmationClient`] and
//! [`RegistrationClient`] and can be shared between a poller and a submitter.
//!
//! # Features
//!
//! - **Scripted confirmations**: queue the answers the next checks return
//! - **Failure injection**: fail the next N checks or registrations, or delay every call
//! - **Request recording**: inspect the emails checked and the registrations received
//! - **Concurrency tracking**: the highest number of overlapping calls seen
//! - **Flaky identity provider**: [`FlakyIdentity`] fails the next N identity
//!   reads without touching the session behind it
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use optin_sdk::{GateSession, SessionIdentity, mock::{MockBackend, test_config}};
//! use optin_types::Identity;
//!
//! #[tokio::test]
//! async fn test_confirmation() {
//!     let backend = Arc::new(MockBackend::new());
//!     backend.push_confirmations([false, true]);
//!
//!     let session = SessionIdentity::signed_in(Identity::with_email("a@x.com"));
//!     let gate = GateSession::builder()
//!         .config(test_config())
//!         .identity(Arc::new(session))
//!         .confirmations(backend.clone())
//!         .registrations(backend)
//!         .build();
//!     gate.poll_once().await;
//! }
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use optin_types::{Identity, RegistrationAck, RegistrationRequest};
use parking_lot::RwLock;
use serde_json::json;

use crate::{
    backend::{ConfirmationClient, RegistrationClient},
    config::ClientConfig,
    error::{Result, SdkError, TransportSnafu},
    identity::{IdentityFacade, SessionIdentity},
};

/// Shared state for the mock backend.
#[derive(Debug, Default)]
struct MockState {
    /// Answers returned by the next confirmation checks, in order.
    confirmations: RwLock<VecDeque<bool>>,

    /// Answer returned once the scripted queue is empty.
    confirmed_fallback: RwLock<bool>,

    /// Emails received by confirmation checks.
    confirmation_requests: RwLock<Vec<String>>,

    /// Registration requests received.
    registrations: RwLock<Vec<RegistrationRequest>>,

    /// Number of confirmation checks still to fail.
    confirmation_failures: AtomicUsize,

    /// Messages returned by the next failing registrations.
    registration_failures: RwLock<VecDeque<String>>,

    /// Delay applied to every call (milliseconds).
    delay_ms: AtomicU64,

    /// Calls currently being served.
    in_flight_confirmations: AtomicUsize,
    in_flight_registrations: AtomicUsize,

    /// Highest overlap observed.
    max_concurrent_confirmations: AtomicUsize,
    max_concurrent_registrations: AtomicUsize,
}

/// Scriptable in-memory backend.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: MockState,
}

/// Decrements an in-flight counter on drop, including when the call future
/// is dropped mid-delay.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    /// Creates a backend that answers "not confirmed" and accepts every
    /// registration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues answers for the next confirmation checks.
    pub fn push_confirmations(&self, answers: impl IntoIterator<Item = bool>) {
        self.state.confirmations.write().extend(answers);
    }

    /// Sets the answer returned once the queue is exhausted.
    pub fn set_confirmed(&self, confirmed: bool) {
        *self.state.confirmed_fallback.write() = confirmed;
    }

    /// Fails the next `count` confirmation checks with a 503 transport error.
    pub fn inject_confirmation_failures(&self, count: usize) {
        self.state.confirmation_failures.store(count, Ordering::SeqCst);
    }

    /// Fails the next registration with `message` as the backend error.
    pub fn inject_registration_failure(&self, message: impl Into<String>) {
        self.state.registration_failures.write().push_back(message.into());
    }

    /// Injects a delay for all subsequent calls.
    ///
    /// Sets to 0 to disable delay.
    pub fn inject_delay(&self, millis: u64) {
        self.state.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the total number of confirmation checks received.
    pub fn confirmation_count(&self) -> usize {
        self.state.confirmation_requests.read().len()
    }

    /// Returns the emails received by confirmation checks, in order.
    pub fn confirmation_requests(&self) -> Vec<String> {
        self.state.confirmation_requests.read().clone()
    }

    /// Returns the total number of registrations received.
    pub fn registration_count(&self) -> usize {
        self.state.registrations.read().len()
    }

    /// Returns the registrations received, in order.
    pub fn registrations(&self) -> Vec<RegistrationRequest> {
        self.state.registrations.read().clone()
    }

    /// Returns the highest number of overlapping confirmation checks.
    pub fn max_concurrent_confirmations(&self) -> usize {
        self.state.max_concurrent_confirmations.load(Ordering::SeqCst)
    }

    /// Returns the highest number of overlapping registrations.
    pub fn max_concurrent_registrations(&self) -> usize {
        self.state.max_concurrent_registrations.load(Ordering::SeqCst)
    }

    /// Resets all state to initial values.
    pub fn reset(&self) {
        self.state.confirmations.write().clear();
        *self.state.confirmed_fallback.write() = false;
        self.state.confirmation_requests.write().clear();
        self.state.registrations.write().clear();
        self.state.registration_failures.write().clear();
        self.state.confirmation_failures.store(0, Ordering::SeqCst);
        self.state.delay_ms.store(0, Ordering::SeqCst);
        self.state.max_concurrent_confirmations.store(0, Ordering::SeqCst);
        self.state.max_concurrent_registrations.store(0, Ordering::SeqCst);
    }

    async fn apply_delay(&self) {
        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn take_confirmation_failure(&self) -> bool {
        self.state
            .confirmation_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConfirmationClient for MockBackend {
    async fn subscription_confirmed(&self, email: &str) -> Result<bool> {
        self.state.confirmation_requests.write().push(email.to_string());
        let _in_flight = InFlight::enter(
            &self.state.in_flight_confirmations,
            &self.state.max_concurrent_confirmations,
        );
        self.apply_delay().await;

        if self.take_confirmation_failure() {
            return TransportSnafu {
                message: "Injected confirmation failure",
                status: Some(503u16),
                payload: None::<String>,
            }
            .fail();
        }

        let fallback = *self.state.confirmed_fallback.read();
        Ok(self.state.confirmations.write().pop_front().unwrap_or(fallback))
    }
}

#[async_trait]
impl RegistrationClient for MockBackend {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationAck> {
        self.state.registrations.write().push(request.clone());
        let _in_flight = InFlight::enter(
            &self.state.in_flight_registrations,
            &self.state.max_concurrent_registrations,
        );
        self.apply_delay().await;

        let failure = self.state.registration_failures.write().pop_front();
        if let Some(message) = failure {
            let payload = json!({ "message": message }).to_string();
            return TransportSnafu { message, status: Some(500u16), payload: Some(payload) }.fail();
        }

        Ok(RegistrationAck { body: json!({ "ok": true }) })
    }
}

/// Identity provider that fails on demand.
///
/// Reads are answered by the wrapped [`SessionIdentity`] unless a failure was
/// injected, in which case the read returns [`SdkError::IdentityProvider`]
/// while the session itself stays signed in.
#[derive(Debug, Clone)]
pub struct FlakyIdentity {
    session: SessionIdentity,
    failures: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl FlakyIdentity {
    /// Wraps `session`.
    #[must_use]
    pub fn new(session: SessionIdentity) -> Self {
        Self { session, failures: Default::default(), reads: Default::default() }
    }

    /// Makes the next `count` reads fail.
    pub fn inject_failures(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of reads served so far, failed or not.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// The wrapped session.
    #[must_use]
    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }
}

#[async_trait]
impl IdentityFacade for FlakyIdentity {
    async fn current_identity(&self) -> Result<Identity> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
        {
            return Err(SdkError::IdentityProvider { message: "Injected provider failure".into() });
        }
        self.session.current_identity().await
    }
}

/// Returns a valid configuration pointing at an unroutable local address.
///
/// Intended for tests that pair it with [`MockBackend`].
///
/// # Panics
///
/// Never in practice; the literal configuration is valid.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .base_url("http://127.0.0.1:9")
        .poll_interval(Duration::from_millis(2000))
        .request_timeout(Duration::from_millis(500))
        .build()
        .expect("static test configuration is valid")
}
