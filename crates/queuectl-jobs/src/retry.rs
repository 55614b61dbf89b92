//! Retry policy for failed jobs.
//!
//! Both decisions are pure functions of their arguments. Workers build a
//! fresh [`RetryPolicy`] from the configuration snapshot of each poll
//! cycle, so a changed `backoff_base` applies to the very next failure.

use queuectl_config::QueueConfig;
use std::time::Duration;

/// Upper bound on any retry delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Delay before a job that has failed `attempts` times may run again.
///
/// Computes `min(base ^ attempts, 5)` seconds.
#[must_use]
pub fn backoff(attempts: u32, base: f64) -> Duration {
    let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
    let secs = base.powi(exponent);

    if !secs.is_finite() || secs >= BACKOFF_CAP.as_secs_f64() {
        BACKOFF_CAP
    } else if secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// Returns true once a job has used up its attempts.
///
/// `attempts` already includes the execution that just failed.
#[must_use]
pub const fn should_dead_letter(attempts: u32, max_retries: u32) -> bool {
    attempts >= max_retries
}

/// Outcome of evaluating the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make the job claimable again after `delay`.
    Retry { delay: Duration },
    /// Move the job to the dead-letter set.
    DeadLetter,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_base: 2.0 }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given backoff base.
    #[must_use]
    pub fn new(backoff_base: f64) -> Self {
        Self { backoff_base }
    }

    /// Creates a policy from a configuration snapshot.
    #[must_use]
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.backoff_base)
    }

    /// Calculate delay for the given attempt number.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        backoff(attempts, self.backoff_base)
    }

    /// Decides what happens to a job whose attempt number `attempts` failed.
    #[must_use]
    pub fn decide(&self, attempts: u32, max_retries: u32) -> RetryDecision {
        if should_dead_letter(attempts, max_retries) {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::Retry {
                delay: self.delay_for_attempt(attempts),
            }
        }
    }
}
