//! Durable job storage.
//!
//! The store is the only component that reads or writes job records and
//! the sole authority for state transitions. Every transition is a
//! conditional update on the current state (and, for processing jobs,
//! the claim token), so independent processes never need to coordinate
//! in memory.

mod sqlite;

pub use sqlite::SqliteJobStore;

use crate::error::JobResult;
use crate::job::{Claim, Job, JobId, JobState, NewJob};
use crate::retry::RetryDecision;
use crate::status::StatusSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Outcome of a failed attempt, as written by [`JobStore::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureUpdate {
    /// Attempt count including the failed execution.
    pub attempts: u32,
    /// Human-readable cause of the failure.
    pub error: String,
    /// Earliest time the job may be claimed again.
    pub next_eligible_at: DateTime<Utc>,
    /// Move to `dead` instead of `failed`.
    pub dead: bool,
}

impl FailureUpdate {
    /// Builds the update for a retry policy decision made at `now`.
    #[must_use]
    pub fn from_decision(
        attempts: u32,
        error: impl Into<String>,
        decision: RetryDecision,
        now: DateTime<Utc>,
    ) -> Self {
        let (next_eligible_at, dead) = match decision {
            RetryDecision::Retry { delay } => (
                now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
                false,
            ),
            RetryDecision::DeadLetter => (now, true),
        };

        Self {
            attempts,
            error: error.into(),
            next_eligible_at,
            dead,
        }
    }

    /// Returns the state the job moves to.
    #[must_use]
    pub const fn target_state(&self) -> JobState {
        if self.dead {
            JobState::Dead
        } else {
            JobState::Failed
        }
    }
}

/// Job storage backend trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new pending job.
    ///
    /// `default_max_retries` applies when the job carries no ceiling of its own.
    async fn enqueue(&self, job: &NewJob, default_max_retries: u32) -> JobResult<Job>;

    /// Atomically claims the oldest eligible job for `worker_id`.
    async fn claim_next(&self, worker_id: &str) -> JobResult<Option<Job>>;

    /// Refreshes the liveness timestamp of a held claim.
    async fn heartbeat(&self, claim: &Claim) -> JobResult<()>;

    /// Marks a claimed job as completed.
    async fn complete(&self, claim: &Claim) -> JobResult<Job>;

    /// Records a failed attempt of a claimed job.
    async fn fail(&self, claim: &Claim, update: &FailureUpdate) -> JobResult<Job>;

    /// Fetches a single job.
    async fn get(&self, id: &JobId) -> JobResult<Option<Job>>;

    /// Lists jobs in creation order, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>>;

    /// Moves a dead job back to pending with a fresh attempt budget.
    async fn dlq_retry(&self, id: &JobId) -> JobResult<Job>;

    /// Returns processing jobs whose last heartbeat is at least `threshold` old.
    async fn stale_claims(&self, threshold: Duration) -> JobResult<Vec<Job>>;

    /// Records a failed attempt for an abandoned claim.
    ///
    /// The write only happens if the claim's last heartbeat is still at
    /// least `threshold` old; an owner that heartbeated in the meantime
    /// keeps its job and the call returns `StaleClaim`.
    async fn reclaim(
        &self,
        claim: &Claim,
        update: &FailureUpdate,
        threshold: Duration,
    ) -> JobResult<Job>;

    /// Counts jobs per state.
    async fn status_summary(&self) -> JobResult<StatusSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_update_retry() {
        let now = Utc::now();
        let update = FailureUpdate::from_decision(
            1,
            "exit_code=1",
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
            },
            now,
        );

        assert!(!update.dead);
        assert_eq!(update.target_state(), JobState::Failed);
        assert_eq!(update.next_eligible_at - now, chrono::Duration::seconds(2));
    }

    #[test]
    fn test_failure_update_dead_letter() {
        let now = Utc::now();
        let update = FailureUpdate::from_decision(3, "exit_code=1", RetryDecision::DeadLetter, now);

        assert!(update.dead);
        assert_eq!(update.target_state(), JobState::Dead);
        assert_eq!(update.attempts, 3);
    }
}
