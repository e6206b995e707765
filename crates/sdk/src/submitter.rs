//! Registration submitter.
//!
//! Sends the user's registration message together with their identity
//! attributes. At most one registration call is outstanding per submitter;
//! a second `submit` while one is in flight is rejected with
//! [`SdkError::Busy`] rather than queued.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use optin_types::{
    DEFAULT_MAX_MESSAGE_BYTES, FlowEvent, Identity, RegistrationRequest, SubmissionOutcome,
    validation::validate_submission,
};
use tracing::{debug, info, warn};

use crate::{
    backend::RegistrationClient,
    error::{Result, SdkError},
    metrics::{FlowMetrics, NoopFlowMetrics},
    store::FlowStateStore,
};

/// Default timeout for the registration call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure message recorded when a submission future is dropped mid-call.
pub const CANCELLED_MESSAGE: &str = "submission cancelled";

/// Single-flight registration sender bound to one [`FlowStateStore`].
pub struct RegistrationSubmitter {
    client: Arc<dyn RegistrationClient>,
    store: Arc<FlowStateStore>,
    metrics: Arc<dyn FlowMetrics>,
    request_timeout: Duration,
    max_message_bytes: usize,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for RegistrationSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationSubmitter")
            .field("request_timeout", &self.request_timeout)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("in_flight", &self.is_in_flight())
            .finish_non_exhaustive()
    }
}

/// Holds the in-flight flag for one submission.
///
/// Releasing the flag always happens last, after the outcome has been applied,
/// so the next submission can never observe a stale `InFlight`. A guard
/// dropped before [`settle`](Self::settle) means the caller's future was
/// dropped mid-call.
struct InFlightGuard<'a> {
    submitter: &'a RegistrationSubmitter,
    settled: bool,
}

impl InFlightGuard<'_> {
    fn settle(mut self, event: FlowEvent) {
        self.submitter.store.apply(event);
        self.settled = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Registration future dropped mid-call");
            self.submitter
                .store
                .apply(FlowEvent::SubmissionFailed { message: CANCELLED_MESSAGE.to_string() });
        }
        self.submitter.in_flight.store(false, Ordering::Release);
    }
}

#[bon::bon]
impl RegistrationSubmitter {
    /// Creates an idle submitter.
    #[builder]
    pub fn new(
        client: Arc<dyn RegistrationClient>,
        store: Arc<FlowStateStore>,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
        #[builder(default = DEFAULT_MAX_MESSAGE_BYTES)] max_message_bytes: usize,
        #[builder(default = Arc::new(NoopFlowMetrics))] metrics: Arc<dyn FlowMetrics>,
    ) -> Self {
        Self {
            client,
            store,
            metrics,
            request_timeout,
            max_message_bytes,
            in_flight: AtomicBool::new(false),
        }
    }
}

impl RegistrationSubmitter {
    /// Returns true while a registration call is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submits a registration for `identity` with `message`.
    ///
    /// Backend failures and timeouts are not errors: they resolve to
    /// [`SubmissionOutcome::Failed`] carrying a user-facing message, and the
    /// same outcome is recorded in the store. No retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::InvalidInput`] if nobody is signed in or the message
    /// is blank or too long, and [`SdkError::Busy`] if another submission is in
    /// flight. Neither makes a network call or changes the store.
    pub async fn submit(
        &self,
        identity: Option<&Identity>,
        message: &str,
    ) -> Result<SubmissionOutcome> {
        let identity = match validate_submission(identity, message, self.max_message_bytes) {
            Ok(identity) => identity,
            Err(e) => {
                debug!(field = %e.field, constraint = %e.constraint, "Submission rejected");
                self.metrics.record_submission_rejected("invalid_input");
                return Err(e.into());
            },
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(email = %identity.email, "Submission rejected; another is in flight");
            self.metrics.record_submission_rejected("busy");
            return Err(SdkError::Busy);
        }
        let guard = InFlightGuard { submitter: self, settled: false };
        self.store.apply(FlowEvent::SubmissionStarted);

        let request = RegistrationRequest::new(identity.clone(), message);
        let started = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, self.client.register(&request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SdkError::Timeout {
                duration_ms: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        self.metrics.record_submission(started.elapsed(), result.is_ok());

        match result {
            Ok(_ack) => {
                info!(email = %identity.email, "Registration submitted");
                guard.settle(FlowEvent::SubmissionSucceeded);
                Ok(SubmissionOutcome::Succeeded)
            },
            Err(e) => {
                let message = e.user_message();
                warn!(
                    email = %identity.email,
                    error = %e,
                    status = ?e.status(),
                    payload = ?e.payload(),
                    "Registration failed"
                );
                guard.settle(FlowEvent::SubmissionFailed { message: message.clone() });
                Ok(SubmissionOutcome::Failed { message })
            },
        }
    }
}
