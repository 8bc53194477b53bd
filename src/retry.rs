//! Retry logic with exponential backoff
//!
//! This module is a pure control-flow decorator: it performs no I/O of its own
//! beyond sleeping between attempts. An operation is attempted up to
//! `max_retries + 1` times; after each failure the error is classified, and
//! non-retryable errors or exhausted retries are returned immediately.
//!
//! # Example
//!
//! ```no_run
//! use provider_pulse::retry::with_retry;
//! use provider_pulse::{Error, RetryConfig};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryConfig::default();
//! // A 503 from the sink is retried, a 403 is returned straight away
//! let receipt = with_retry(&policy, || async {
//!     Err::<(), _>(Error::Sink { status: 503, message: "busy".into() })
//! })
//! .await;
//! assert!(receipt.is_err());
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (5xx responses, timeouts, refused connections) should return `true`.
/// Permanent failures (4xx responses, bad configuration, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Sink { status, .. } => (500..=599).contains(status),
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::Discovery(_) => false,
            // A failed clear is never retried
            Error::BufferClear { .. } => false,
        }
    }
}

/// Execute an async operation with exponential backoff, classifying errors via [`IsRetryable`]
///
/// Returns the successful result or the last error after all retries are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_if(config, operation, |e: &E| e.is_retryable()).await
}

/// Execute an async operation with exponential backoff and a caller-supplied retry predicate
///
/// # Arguments
///
/// * `config` - Retry budget, initial delay, delay ceiling, multiplier and jitter
/// * `operation` - Async closure producing `Result<T, E>`; invoked once per attempt
/// * `is_retryable` - Decides whether a failed attempt may be retried
///
/// # Returns
///
/// The first successful result, or the error of the final attempt. A
/// non-retryable error is returned without any further delay.
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay.min(config.max_delay);

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < config.max_retries && is_retryable(&e) => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "Attempt failed, retrying"
                );

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if is_retryable(&e) {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retries exhausted"
                    );
                } else {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
