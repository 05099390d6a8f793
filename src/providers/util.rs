use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async request with configurable attempts and delays
///
/// Only transport failures (connect errors, timeouts) are retried; a response
/// that arrived with an error status is returned to the caller immediately.
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                let transient = err.is_connect() || err.is_timeout();
                if !transient || attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
