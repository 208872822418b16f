//! Bounded retry for fallible async operations.
//!
//! Attempts run back to back with no delay: the probe's statements are cheap,
//! read-only and already subject to the connection's own timeouts.
use crate::config::RetrySettings;
use std::future::Future;
use tracing::{error, warn};

/// Execute an async operation until it succeeds or `settings.max_attempts` invocations
/// have failed. Returns the last failure once the budget is spent.
///
/// A budget of zero still performs one attempt.
pub async fn retry_async<T, E, F, Fut>(
    operation_name: &str,
    settings: RetrySettings,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= max_attempts => {
                error!(
                    operation = operation_name,
                    attempts = max_attempts,
                    error = %e,
                    "Retry budget exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Operation failed, retrying"
                );
            }
        }
    }
}
