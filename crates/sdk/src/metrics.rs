//! Pluggable observability hook for the gate.
//!
//! Poll failures are deliberately not surfaced to the user. Implement
//! [`FlowMetrics`] to observe them (and the rest of the flow) instead. Two
//! implementations are included:
//!
//! - [`NoopFlowMetrics`]: default, discards everything.
//! - [`MetricsFlowMetrics`]: forwards to the [`metrics`](https://docs.rs/metrics) facade.
//!
//! # Metric Names
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `optin_sdk_polls_total` | Counter | `result` | Confirmation checks by result (`pending`, `confirmed`, `failed`) |
//! | `optin_sdk_poll_failures_total` | Counter | `error_type` | Failed confirmation checks by error class |
//! | `optin_sdk_confirmations_total` | Counter | | Confirmations observed |
//! | `optin_sdk_submissions_total` | Counter | `status` | Registration submissions by outcome |
//! | `optin_sdk_submission_duration_seconds` | Histogram | | Registration call latency |
//! | `optin_sdk_submissions_rejected_total` | Counter | `reason` | Submissions rejected locally (`busy`, `invalid_input`) |

use std::{fmt, time::Duration};

/// Result of one confirmation check, as reported to [`FlowMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The check answered "not confirmed yet".
    Pending,
    /// The check answered "confirmed".
    Confirmed,
    /// The check failed (transport error or timeout).
    Failed,
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Observability hook.
///
/// All methods default to no-ops. Implementations must be `Send + Sync`; one
/// instance is shared by the poller and the submitter.
pub trait FlowMetrics: Send + Sync + fmt::Debug {
    /// Records a completed confirmation check.
    fn record_poll(&self, result: PollResult) {
        let _ = result;
    }

    /// Records a failed confirmation check with its error class.
    fn record_poll_failure(&self, error_type: &str) {
        let _ = error_type;
    }

    /// Records that confirmation was observed.
    fn record_confirmation(&self) {}

    /// Records a finished registration call.
    fn record_submission(&self, duration: Duration, success: bool) {
        let _ = (duration, success);
    }

    /// Records a submission rejected before any network call.
    fn record_submission_rejected(&self, reason: &str) {
        let _ = reason;
    }
}

/// No-op metrics implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFlowMetrics;

impl FlowMetrics for NoopFlowMetrics {}

/// Metrics implementation using the `metrics` crate facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFlowMetrics;

mod metric_names {
    pub const POLLS_TOTAL: &str = "optin_sdk_polls_total";
    pub const POLL_FAILURES_TOTAL: &str = "optin_sdk_poll_failures_total";
    pub const CONFIRMATIONS_TOTAL: &str = "optin_sdk_confirmations_total";
    pub const SUBMISSIONS_TOTAL: &str = "optin_sdk_submissions_total";
    pub const SUBMISSION_DURATION: &str = "optin_sdk_submission_duration_seconds";
    pub const SUBMISSIONS_REJECTED_TOTAL: &str = "optin_sdk_submissions_rejected_total";
}

impl FlowMetrics for MetricsFlowMetrics {
    fn record_poll(&self, result: PollResult) {
        metrics::counter!(metric_names::POLLS_TOTAL, "result" => result.to_string()).increment(1);
    }

    fn record_poll_failure(&self, error_type: &str) {
        metrics::counter!(metric_names::POLL_FAILURES_TOTAL, "error_type" => error_type.to_string())
            .increment(1);
    }

    fn record_confirmation(&self) {
        metrics::counter!(metric_names::CONFIRMATIONS_TOTAL).increment(1);
    }

    fn record_submission(&self, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        metrics::counter!(metric_names::SUBMISSIONS_TOTAL, "status" => status).increment(1);
        metrics::histogram!(metric_names::SUBMISSION_DURATION).record(duration.as_secs_f64());
    }

    fn record_submission_rejected(&self, reason: &str) {
        metrics::counter!(metric_names::SUBMISSIONS_REJECTED_TOTAL, "reason" => reason.to_string())
            .increment(1);
    }
}
