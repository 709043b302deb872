//! Bounded retry with backoff, and blocking waits.
//!
//! [`retry_with_backoff`] retries an operation only while its error satisfies a
//! retryable predicate, so an unexpected error is never retried blindly.
//! [`wait_for`] polls a condition until it holds or a timeout passes.

use crate::error::{Error, Result};
use rand::Rng;
use std::time::{Duration, Instant};

/// Backoff policy for [`retry_with_backoff`].
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every attempt.
    pub factor: f64,
    /// Random spread applied to each delay, 0.1 = +/-10%.
    pub jitter: f64,
    /// Maximum number of attempts, including the first.
    pub steps: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.5,
            jitter: 0.1,
            steps: 5,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// No sleeping between attempts.
    pub fn immediate(steps: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            jitter: 0.0,
            steps,
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, retrying errors for which `retryable` holds.
///
/// # Arguments
/// * `backoff` - Attempt count and delays
/// * `operation_name` - Name for logging purposes
/// * `operation` - The call to retry
/// * `retryable` - Which errors are worth another attempt
///
/// # Returns
/// The first success, the first non-retryable error, or the last error once
/// the attempts are used up.
pub fn retry_with_backoff<T, E, F, P>(
    backoff: &Backoff,
    operation_name: &str,
    mut operation: F,
    retryable: P,
) -> std::result::Result<T, E>
where
    F: FnMut() -> std::result::Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = backoff.initial_delay;

    loop {
        attempt += 1;

        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !retryable(&e) => return Err(e),
            Err(e) => {
                if attempt >= backoff.steps.max(1) {
                    log::warn!("{operation_name} failed after {attempt} attempts: {e}");
                    return Err(e);
                }

                let jittered = if backoff.jitter > 0.0 {
                    let spread = rand::thread_rng().gen_range(-backoff.jitter..=backoff.jitter);
                    Duration::from_secs_f64((delay.as_secs_f64() * (1.0 + spread)).max(0.0))
                } else {
                    delay
                };

                log::debug!(
                    "{operation_name} attempt {attempt} failed, retrying in {}ms: {e}",
                    jittered.as_millis()
                );
                if !jittered.is_zero() {
                    std::thread::sleep(jittered);
                }

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * backoff.factor).min(backoff.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Poll `condition` every `interval` until it returns true.
///
/// Errors from `condition` abort the wait. Fails with [`Error::Timeout`]
/// naming `what` once `timeout` has passed.
pub fn wait_for<F>(timeout: Duration, interval: Duration, what: &str, mut condition: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    loop {
        if condition()? {
            log::debug!("{what} ready after {}ms", start.elapsed().as_millis());
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(Error::Timeout(what.to_string()));
        }
        log::trace!("waiting for {what}");
        std::thread::sleep(interval);
    }
}
