//! Retry utilities with exponential backoff and jitter.
//!
//! [`retry_with_backoff`] repeats an async operation while a caller-supplied
//! predicate classifies its error as retryable. The conflict mutator in
//! [`crate::mutate`] shares the same [`RetryConfig`] and [`Backoff`] policy.
//!
//! # Example
//!
//! ```ignore
//! use layercheck_common::retry::{retry_with_backoff, RetryConfig};
//!
//! let pool = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(5),
//!     "get_pool",
//!     |e: &Error| e.is_retryable(),
//!     || async { store.get("layered").await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Policy for optimistic-concurrency conflicts.
    ///
    /// Five attempts, 10ms apart. Conflicts clear as soon as the competing
    /// writer commits, so there is nothing to gain from growing the delay.
    pub fn conflict_default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 1.0,
        }
    }

    /// Whether `attempt` (1-based) is the last one allowed
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Delay schedule derived from a [`RetryConfig`]
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Backoff {
    /// Start a new schedule at the config's initial delay
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.backoff_multiplier,
        }
    }

    /// Next delay to sleep, with 0.5x to 1.5x jitter, then advance the schedule
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(self.delay.as_secs_f64() * jitter);

        // Exponential backoff, capped at max_delay
        self.delay = Duration::from_secs_f64(
            (self.delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        );

        jittered
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Errors for which `is_retryable` returns false are returned immediately.
/// Retryable errors are retried until success or until `max_attempts` is
/// reached, in which case the last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut backoff = Backoff::new(config);

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if config.is_exhausted(attempt) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = backoff.next_delay();
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
