//! Test assertion helpers.
//!
//! Waiting helpers for async tests. Both work under tokio's paused clock:
//! their sleeps and timeouts auto-advance virtual time.

use std::time::Duration;

use tokio::{
    sync::watch,
    time::{Instant, sleep},
};

/// Interval between checks in [`assert_eventually`].
const CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Re-checks `condition` until it holds or `timeout` expires.
///
/// Returns whether the condition held. Prefer [`wait_for_value`] when the
/// state under test is published on a watch channel.
///
/// # Example
///
/// ```no_run
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use optin_test_utils::assert_eventually;
///
/// #[tokio::test]
/// async fn test_background_flag() {
///     let flag = Arc::new(AtomicBool::new(false));
///     let setter = flag.clone();
///     tokio::spawn(async move { setter.store(true, Ordering::SeqCst) });
///
///     assert!(assert_eventually(Duration::from_millis(200), || flag.load(Ordering::SeqCst)).await);
/// }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(CHECK_INTERVAL).await;
    }
}

/// Waits until the value on `rx` satisfies `predicate`, returning a clone of
/// the matching value.
///
/// Returns `None` on timeout or when the sender is dropped first. The current
/// value is checked before waiting.
pub async fn wait_for_value<T, F>(
    rx: &mut watch::Receiver<T>,
    timeout: Duration,
    predicate: F,
) -> Option<T>
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(timeout, rx.wait_for(predicate))
        .await
        .ok()
        .and_then(Result::ok)
        .map(|value| value.clone())
}
