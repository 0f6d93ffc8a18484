//! Bounded-attempt retry with pluggable backoff
//!
//! [`retry_with_backoff`] runs an async operation up to a fixed number of
//! attempts, sleeping between attempts for as long as the supplied
//! [`Backoff`] strategy says. Production code builds an
//! [`ExponentialBackoff`] from [`RetryConfig`] (with the default multiplier
//! of 1.0 it is a fixed interval); tests pass [`NoBackoff`].
//!
//! # Example
//!
//! ```no_run
//! use channel_archiver::retry::{IsRetryable, NoBackoff, retry_with_backoff};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() {
//! let result = retry_with_backoff(3, &NoBackoff, |_attempt| async {
//!     Ok::<_, Flaky>(42)
//! })
//! .await;
//! assert_eq!(result.ok(), Some(42));
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Everything that can go wrong inside a single transfer attempt
            Error::Resolution { .. }
            | Error::EmptyDownload { .. }
            | Error::HttpStatus { .. }
            | Error::Network(_)
            | Error::Io(_) => true,
            // Already the product of a retry loop
            Error::Transfer { .. } => false,
            Error::Listing { .. }
            | Error::Config { .. }
            | Error::InvalidItemId(_)
            | Error::Cancelled => false,
            Error::Upload(_)
            | Error::Persist { .. }
            | Error::Commit(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Strategy deciding how long to wait between attempts
pub trait Backoff: Send + Sync {
    /// Delay after the failed attempt number `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Duration;
}

/// Never waits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Exponential backoff capped at `max_delay`, optionally jittered
///
/// A multiplier of 1.0 turns this into a fixed interval.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Build the backoff described by a retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier.max(1.0),
            jitter: config.jitter,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let base = if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        };

        if self.jitter { add_jitter(base) } else { base }
    }
}

/// The operation failed on its last permitted attempt
#[derive(Debug)]
pub struct AttemptsExhausted<E> {
    /// Number of attempts actually made
    pub attempts: u32,
    /// Error returned by the final attempt
    pub last_error: E,
}

/// Run `operation` up to `max_attempts` times
///
/// The operation receives the 1-based attempt number. A non-retryable error
/// ends the loop immediately. No delay follows the final attempt.
/// `max_attempts` of zero is treated as one.
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_attempts: u32,
    backoff: &dyn Backoff,
    mut operation: F,
) -> Result<T, AttemptsExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff.delay(attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "attempt failed, retrying"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "operation failed after all attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(AttemptsExhausted {
                    attempts: attempt,
                    last_error: e,
                });
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
