//! Bounded retry of units that lost a serialization race.

use std::future::Future;
use std::time::Duration;

use ledgerpay_core::LedgerResult;

/// Attempts per operation, the first one included.
pub const MAX_ATTEMPTS: u32 = 4;

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);

/// Run `operation` until it succeeds, fails with a non-retryable error or runs out of
/// attempts. Only [`LedgerError::Conflict`](ledgerpay_core::LedgerError::Conflict) is
/// retried; the failed unit has already been rolled back when it surfaces.
pub async fn retry_on_conflict<T, F, Fut>(operation: &'static str, mut run: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match run().await {
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(operation, attempt, ?delay, error = %err, "unit conflicted, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(operation, attempts = attempt, error = %err, "unit kept conflicting");
                return Err(err);
            }
            outcome => return outcome,
        }
    }
}
