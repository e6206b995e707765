//! Gate session.
//!
//! [`GateSession`] wires one [`FlowStateStore`], one [`ConfirmationPoller`]
//! and one [`RegistrationSubmitter`] together and reacts to identity changes:
//!
//! - sign-in (or a new email) starts polling unless already confirmed
//! - sign-out resets the flow and stops polling
//! - [`shutdown`](GateSession::shutdown) or dropping the session stops
//!   everything
//!
//! Identity changes may be pushed one at a time with
//! [`identity_changed`](GateSession::identity_changed) or streamed from a
//! watch channel with [`follow`](GateSession::follow).

use std::sync::Arc;

use optin_types::{FlowEvent, FlowState, Identity, SubmissionOutcome};
use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backend::{ConfirmationClient, HttpBackend, RegistrationClient},
    config::ClientConfig,
    error::Result,
    identity::{IdentityFacade, read_identity},
    metrics::{FlowMetrics, NoopFlowMetrics},
    poller::{ConfirmationPoller, PollerStats, TickOutcome},
    store::FlowStateStore,
    submitter::RegistrationSubmitter,
};

struct SessionInner {
    config: ClientConfig,
    identity: Arc<dyn IdentityFacade>,
    store: Arc<FlowStateStore>,
    poller: ConfirmationPoller,
    submitter: RegistrationSubmitter,
}

impl SessionInner {
    fn identity_changed(&self, identity: Option<Identity>) -> FlowState {
        match identity {
            None => {
                self.poller.stop();
                let state = self.store.apply(FlowEvent::IdentityObserved(None));
                info!("Signed out; flow reset");
                state
            },
            Some(identity) => {
                let email = identity.email.clone();
                let state = self.store.apply(FlowEvent::IdentityObserved(Some(identity)));
                if state.confirmation.is_confirmed() {
                    debug!(%email, "Identity already confirmed; not polling");
                } else if !self.poller.is_running() {
                    info!(%email, "Signed in; waiting for subscription confirmation");
                    if let Err(e) = self.poller.start(self.config.poll_interval()) {
                        warn!(error = %e, "Confirmation polling not started");
                    }
                }
                state
            },
        }
    }
}

struct Listener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One user's pass through the opt-in gate.
///
/// Must be used from within a Tokio runtime.
pub struct GateSession {
    inner: Arc<SessionInner>,
    listener: Mutex<Option<Listener>>,
}

impl std::fmt::Debug for GateSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateSession")
            .field("config", &self.inner.config)
            .field("state", &self.inner.store.state())
            .field("poller", &self.inner.poller)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl GateSession {
    /// Creates a session with no identity observed yet.
    ///
    /// Nothing runs until an identity is reported through
    /// [`identity_changed`](Self::identity_changed),
    /// [`follow`](Self::follow) or [`refresh_identity`](Self::refresh_identity).
    #[builder]
    pub fn new(
        config: ClientConfig,
        identity: Arc<dyn IdentityFacade>,
        confirmations: Arc<dyn ConfirmationClient>,
        registrations: Arc<dyn RegistrationClient>,
        #[builder(default = Arc::new(NoopFlowMetrics))] metrics: Arc<dyn FlowMetrics>,
    ) -> Self {
        let store = Arc::new(FlowStateStore::new());
        let poller = ConfirmationPoller::builder()
            .identity(Arc::clone(&identity))
            .client(confirmations)
            .store(Arc::clone(&store))
            .request_timeout(config.request_timeout())
            .metrics(Arc::clone(&metrics))
            .build();
        let submitter = RegistrationSubmitter::builder()
            .client(registrations)
            .store(Arc::clone(&store))
            .request_timeout(config.request_timeout())
            .max_message_bytes(config.max_message_bytes())
            .metrics(metrics)
            .build();

        Self {
            inner: Arc::new(SessionInner { config, identity, store, poller, submitter }),
            listener: Mutex::new(None),
        }
    }
}

impl GateSession {
    /// Creates a session talking to the HTTP backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn connect(config: ClientConfig, identity: Arc<dyn IdentityFacade>) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        Ok(Self::builder()
            .config(config)
            .identity(identity)
            .confirmations(backend.clone())
            .registrations(backend)
            .build())
    }

    /// Applies an identity-changed event and starts or stops polling.
    ///
    /// The store is updated before this returns.
    pub fn identity_changed(&self, identity: Option<Identity>) -> FlowState {
        self.inner.identity_changed(identity)
    }

    /// Reads the identity provider once and applies the result.
    ///
    /// Hosts call this on start-up to pick up an existing session.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the read fails for any reason other
    /// than a missing session, or times out. The flow is left unchanged.
    pub async fn refresh_identity(&self) -> Result<FlowState> {
        let identity =
            read_identity(self.inner.identity.as_ref(), self.inner.config.request_timeout()).await?;
        Ok(self.identity_changed(identity))
    }

    /// Follows a stream of identity changes until the sender is dropped or
    /// the session shuts down.
    ///
    /// The receiver's current value is applied immediately. Following a new
    /// receiver replaces the previous one.
    pub fn follow(&self, mut changes: watch::Receiver<Option<Identity>>) {
        let current = changes.borrow_and_update().clone();
        self.inner.identity_changed(current);

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            debug!("Identity source closed");
                            break;
                        }
                        let identity = changes.borrow_and_update().clone();
                        inner.identity_changed(identity);
                    }
                }
            }
        });

        if let Some(previous) = self.listener.lock().replace(Listener { token, handle }) {
            previous.token.cancel();
            previous.handle.abort();
        }
    }

    /// Runs one confirmation check now, outside the timer.
    pub async fn poll_once(&self) -> TickOutcome {
        self.inner.poller.poll_once().await
    }

    /// Submits a registration for the currently observed identity.
    ///
    /// # Errors
    ///
    /// See [`RegistrationSubmitter::submit`].
    pub async fn submit(&self, message: &str) -> Result<SubmissionOutcome> {
        let identity = self.inner.store.state().identity;
        self.inner.submitter.submit(identity.as_ref(), message).await
    }

    /// Returns the current flow state.
    #[must_use]
    pub fn state(&self) -> FlowState {
        self.inner.store.state()
    }

    /// Subscribes to flow state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.inner.store.subscribe()
    }

    /// Returns true while confirmation polling is active.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_running()
    }

    /// Description of the most recent failed confirmation check.
    #[must_use]
    pub fn last_poll_error(&self) -> Option<String> {
        self.inner.poller.last_error()
    }

    /// Poller activity counters.
    #[must_use]
    pub fn poll_stats(&self) -> PollerStats {
        self.inner.poller.stats()
    }

    /// Returns the session's configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Stops polling and identity following. Idempotent.
    ///
    /// The flow state is left as is; submissions remain possible.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.token.cancel();
            listener.handle.abort();
        }
        self.inner.poller.stop();
    }
}

impl Drop for GateSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
