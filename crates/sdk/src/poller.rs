//! Confirmation poller.
//!
//! Repeatedly re-reads the identity and asks the backend whether the user has
//! accepted the email subscription. Polling is the only confirmation channel
//! available to the client.
//!
//! # Tick
//!
//! ```text
//! read identity ──▶ none  ──▶ reset flow if one was present (sign-out), stop
//!       │         ──▶ error ──▶ record, keep ticking
//!       ▼ some
//! already confirmed? ──▶ yes ──▶ stop
//!       │ no
//!       ▼
//! subscription_confirmed(email) ──▶ true  ──▶ Confirmed, stop
//!                               ──▶ false ──▶ keep ticking
//!                               ──▶ error ──▶ record, keep ticking
//! ```
//!
//! Each tick awaits at most one backend call and the interval skips missed
//! ticks, so a slow call never piles up requests. [`ConfirmationPoller::stop`]
//! cancels the task and discards the result of any call still in flight.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use optin_types::{FlowEvent, FlowState, Identity};
use parking_lot::{Mutex, RwLock};
use snafu::ensure;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backend::ConfirmationClient,
    error::{ConfigSnafu, Result, SdkError},
    identity::{IdentityFacade, read_identity},
    metrics::{FlowMetrics, NoopFlowMetrics, PollResult},
    store::FlowStateStore,
};

/// Default timeout for the identity read and the confirmation call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nobody is signed in; nothing was called.
    NoIdentity,
    /// The identity disappeared since the last read; the flow was reset.
    SignedOut,
    /// The current identity was already confirmed; nothing was called.
    AlreadyConfirmed,
    /// The backend answered "not confirmed yet".
    Pending,
    /// The backend answered "confirmed".
    Confirmed,
    /// The identity read or the check failed; the flow was left unchanged.
    Failed(String),
    /// The poller was stopped while the tick ran; its result was discarded.
    Cancelled,
}

impl TickOutcome {
    /// Returns true if polling has nothing left to do until the identity
    /// changes.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::AlreadyConfirmed | Self::SignedOut | Self::NoIdentity)
    }
}

/// Counters describing poller activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Confirmation calls issued.
    pub requests: u64,
    /// Identity reads or confirmation calls that failed or timed out.
    pub failures: u64,
    /// Confirmations observed.
    pub confirmations: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    ticks: AtomicU64,
    requests: AtomicU64,
    failures: AtomicU64,
    confirmations: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> PollerStats {
        PollerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
        }
    }
}

struct PollerInner {
    identity: Arc<dyn IdentityFacade>,
    client: Arc<dyn ConfirmationClient>,
    store: Arc<FlowStateStore>,
    metrics: Arc<dyn FlowMetrics>,
    request_timeout: Duration,
    last_error: RwLock<Option<String>>,
    stats: StatCounters,
}

struct PollerTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

/// Repeating confirmation check bound to one [`FlowStateStore`].
///
/// Must be started from within a Tokio runtime. Dropping the poller stops it.
pub struct ConfirmationPoller {
    inner: Arc<PollerInner>,
    task: Mutex<Option<PollerTask>>,
}

impl std::fmt::Debug for ConfirmationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationPoller")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl ConfirmationPoller {
    /// Creates a stopped poller.
    #[builder]
    pub fn new(
        identity: Arc<dyn IdentityFacade>,
        client: Arc<dyn ConfirmationClient>,
        store: Arc<FlowStateStore>,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
        #[builder(default = Arc::new(NoopFlowMetrics))] metrics: Arc<dyn FlowMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                identity,
                client,
                store,
                metrics,
                request_timeout,
                last_error: RwLock::new(None),
                stats: StatCounters::default(),
            }),
            task: Mutex::new(None),
        }
    }
}

impl ConfirmationPoller {
    /// Starts polling every `interval`.
    ///
    /// The first check runs one interval after the call. Calling `start`
    /// while already running restarts the cycle with the new interval.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `interval` is zero; a running cycle is
    /// left untouched.
    pub fn start(&self, interval: Duration) -> Result<()> {
        ensure!(!interval.is_zero(), ConfigSnafu { message: "poll interval cannot be zero" });

        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            self.halt(previous);
        }

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let first_tick = tokio::time::Instant::now() + interval;
        let handle = tokio::spawn(run(inner, token.clone(), first_tick, interval));
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "Confirmation polling started");
        *task = Some(PollerTask { token, handle, interval });
        Ok(())
    }

    /// Stops polling. No-op when not running.
    ///
    /// After this returns no further ticks fire and no in-flight check can
    /// change the flow state.
    pub fn stop(&self) {
        if let Some(previous) = self.task.lock().take() {
            self.halt(previous);
            info!("Confirmation polling stopped");
        }
    }

    fn halt(&self, task: PollerTask) {
        self.inner.store.cancel(&task.token);
        task.handle.abort();
    }

    /// Returns true while the polling task is alive.
    ///
    /// Becomes false after [`stop`](Self::stop) and after the poller stops
    /// itself on confirmation or on finding nobody signed in.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.token.is_cancelled() && !t.handle.is_finished())
    }

    /// Interval of the current polling cycle, if running.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.task.lock().as_ref().filter(|t| !t.token.is_cancelled()).map(|t| t.interval)
    }

    /// Runs exactly one tick on the caller's task.
    ///
    /// Useful for stepping the state machine without a timer.
    pub async fn poll_once(&self) -> TickOutcome {
        self.inner.tick(None).await
    }

    /// Description of the most recent failed check, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> PollerStats {
        self.inner.stats.snapshot()
    }
}

impl Drop for ConfirmationPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            self.halt(task);
        }
    }
}

async fn run(
    inner: Arc<PollerInner>,
    token: CancellationToken,
    first_tick: tokio::time::Instant,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => break,
            outcome = inner.tick(Some(&token)) => outcome,
        };

        if outcome.is_terminal() {
            match outcome {
                TickOutcome::Confirmed | TickOutcome::AlreadyConfirmed => {
                    info!("Subscription confirmed; confirmation polling finished");
                },
                _ => info!("No identity; confirmation polling finished"),
            }
            token.cancel();
            break;
        }
    }

    debug!("Confirmation polling task exiting");
}

impl PollerInner {
    /// Applies an event, gated on the task token when there is one.
    fn apply(&self, token: Option<&CancellationToken>, event: FlowEvent) -> Option<FlowState> {
        match token {
            Some(token) => self.store.apply_unless_cancelled(token, event),
            None => Some(self.store.apply(event)),
        }
    }

    async fn tick(&self, token: Option<&CancellationToken>) -> TickOutcome {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let identity = match read_identity(self.identity.as_ref(), self.request_timeout).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return self.observe_signed_out(token),
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "Identity read failed; flow left unchanged"
                );
                return self.record_failure(&e);
            },
        };

        let Some(state) = self.apply(token, FlowEvent::IdentityObserved(Some(identity.clone())))
        else {
            return TickOutcome::Cancelled;
        };
        if state.confirmation.is_confirmed() {
            debug!(email = %identity.email, "Already confirmed; skipping check");
            return TickOutcome::AlreadyConfirmed;
        }

        self.check(token, &identity).await
    }

    fn observe_signed_out(&self, token: Option<&CancellationToken>) -> TickOutcome {
        if self.store.state().identity.is_none() {
            debug!("No identity; skipping tick");
            return TickOutcome::NoIdentity;
        }
        match self.apply(token, FlowEvent::IdentityObserved(None)) {
            Some(_) => {
                info!("Identity disappeared; flow reset");
                TickOutcome::SignedOut
            },
            None => TickOutcome::Cancelled,
        }
    }

    async fn check(&self, token: Option<&CancellationToken>, identity: &Identity) -> TickOutcome {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        debug!(email = %identity.email, "Checking subscription confirmation");

        let result =
            match tokio::time::timeout(self.request_timeout, self.client.subscription_confirmed(&identity.email))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(SdkError::Timeout {
                    duration_ms: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

        match result {
            Ok(true) => {
                let event =
                    FlowEvent::ConfirmationObserved { email: identity.email.clone(), confirmed: true };
                let Some(state) = self.apply(token, event) else {
                    return TickOutcome::Cancelled;
                };
                if !state.confirmation.is_confirmed() {
                    // Identity changed while the call was in flight.
                    debug!(email = %identity.email, "Discarding confirmation for a previous identity");
                    self.metrics.record_poll(PollResult::Pending);
                    return TickOutcome::Pending;
                }
                self.metrics.record_poll(PollResult::Confirmed);
                self.stats.confirmations.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_confirmation();
                info!(email = %identity.email, "Email subscription confirmed");
                TickOutcome::Confirmed
            },
            Ok(false) => {
                self.metrics.record_poll(PollResult::Pending);
                TickOutcome::Pending
            },
            Err(e) => {
                warn!(
                    email = %identity.email,
                    error = %e,
                    transient = e.is_transient(),
                    status = ?e.status(),
                    payload = ?e.payload(),
                    "Subscription confirmation check failed"
                );
                self.record_failure(&e)
            },
        }
    }

    fn record_failure(&self, e: &SdkError) -> TickOutcome {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_poll(PollResult::Failed);
        self.metrics.record_poll_failure(e.error_type());
        let message = e.to_string();
        *self.last_error.write() = Some(message.clone());
        TickOutcome::Failed(message)
    }
}
