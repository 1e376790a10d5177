//! Retry with exponential back-off and jitter for the Keepa client.
//!
//! [`retry_with_backoff`] wraps a fallible async operation and retries only
//! transient transport errors (timeouts, connection failures, 5xx). Rate
//! limits are handled by the caller against the token bucket and must not
//! burn retries; malformed payloads and API-level errors are returned
//! immediately because retrying cannot fix them.

use std::future::Future;
use std::time::Duration;

use crate::error::KeepaError;

/// Returns `true` for errors worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &KeepaError) -> bool {
    match err {
        KeepaError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        KeepaError::Api(_)
        | KeepaError::RateLimited { .. }
        | KeepaError::Malformed { .. }
        | KeepaError::Budget { .. }
        | KeepaError::BatchTooLarge(_)
        | KeepaError::MissingApiKey => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors.
///
/// Back-off doubles from `backoff_base_ms` per attempt, is capped at 60 s,
/// and carries ±25 % jitter so parallel workers do not stampede.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, KeepaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KeepaError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient Keepa error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
