//! Bounded-attempt retry with fixed backoff around cluster calls.

use ::std::future::Future;
use ::std::time::Duration;

use ::sparkwatch_common::{error::Result, tracing::warn};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Retry `op` with the default attempt count and backoff.
pub async fn retry<T, F, Fut>(op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(op, DEFAULT_ATTEMPTS, DEFAULT_BACKOFF).await
}

/// Invoke `op`; on failure sleep `backoff` and try again, up to `attempts`
/// invocations in total. The last error is returned once the attempts are
/// exhausted. The backoff is fixed, not exponential, and the sleep suspends
/// on the runtime so dropping the returned future cancels promptly.
pub async fn retry_with<T, F, Fut>(mut op: F, attempts: u32, backoff: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = attempts.max(1);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                remaining -= 1;
                if remaining == 0 {
                    return Err(error);
                }
                warn!(
                    "Retrying after error ({} attempts left): {}",
                    remaining, error
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
