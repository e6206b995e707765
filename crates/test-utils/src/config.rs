//! Test timing configuration.
//!
//! Centralizes the intervals and timeouts gate tests run with, so timer tests
//! agree on how far to advance the paused clock.

use std::time::Duration;

/// Timing knobs for gate tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct TestTiming {
    /// Confirmation poll interval.
    #[builder(default = Duration::from_millis(2000))]
    pub poll_interval: Duration,
    /// Per-call timeout.
    #[builder(default = Duration::from_millis(500))]
    pub request_timeout: Duration,
    /// Artificial backend latency for slow-call scenarios.
    #[builder(default = Duration::from_millis(100))]
    pub slow_call: Duration,
}

impl TestTiming {
    /// Number of whole poll intervals that fit in `elapsed`.
    #[must_use]
    pub fn ticks_in(&self, elapsed: Duration) -> u32 {
        u32::try_from(elapsed.as_millis() / self.poll_interval.as_millis().max(1)).unwrap_or(u32::MAX)
    }
}

/// Returns the default timing for gate tests:
/// - `poll_interval`: 2s (the production default)
/// - `request_timeout`: 500ms (fails fast under the paused clock)
/// - `slow_call`: 100ms (shorter than the timeout)
#[must_use]
pub fn test_timing() -> TestTiming {
    TestTiming::builder().build()
}
