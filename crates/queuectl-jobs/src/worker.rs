//! Worker loop.
//!
//! One worker runs per process and handles one job at a time:
//! reload configuration, recover abandoned claims, claim, execute,
//! finalise. Nothing carries over between jobs except the worker id.

use crate::error::{JobError, JobResult};
use crate::executor::{ExecutionOutcome, ShellExecutor};
use crate::job::{Claim, Job, JobId, JobState};
use crate::metrics::JobMetrics;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::store::{FailureUpdate, JobStore};
use chrono::Utc;
use queuectl_config::{ConfigLoader, QueueConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Attempts made to record a job's outcome before leaving it to stale-claim recovery.
const FINALIZE_ATTEMPTS: u32 = 5;

/// Builds the identity a worker stamps on its claims.
#[must_use]
pub fn worker_id(index: u32) -> String {
    format!("worker-{index}@{}", std::process::id())
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No job was eligible.
    Idle,
    /// A job ran and its outcome was recorded.
    Finished { job_id: JobId, state: JobState },
    /// A job ran but another worker had already reclaimed it.
    Abandoned { job_id: JobId },
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
    pub abandoned: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Idle => {}
            PollOutcome::Finished { state, .. } => match state {
                JobState::Completed => self.completed += 1,
                JobState::Dead => self.dead += 1,
                _ => self.failed += 1,
            },
            PollOutcome::Abandoned { .. } => self.abandoned += 1,
        }
    }
}

/// A single worker's control loop.
pub struct Worker<S: JobStore> {
    id: String,
    store: Arc<S>,
    config: ConfigLoader,
    executor: ShellExecutor,
}

impl<S: JobStore> Worker<S> {
    /// Creates a worker with the given id.
    pub fn new(id: impl Into<String>, store: Arc<S>, config: ConfigLoader) -> Self {
        Self {
            id: id.into(),
            store,
            config,
            executor: ShellExecutor::default(),
        }
    }

    /// Replaces the shell executor.
    #[must_use]
    pub fn with_executor(mut self, executor: ShellExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Returns the worker id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs until `shutdown` is triggered, finishing any job in progress first.
    pub async fn run(&self, shutdown: Shutdown) -> WorkerStats {
        info!(worker_id = %self.id, "Starting worker");

        let mut settings = self.config.get().await;
        let mut stats = WorkerStats::default();

        while !shutdown.is_triggered() {
            settings = self.refresh_settings(settings).await;

            match self.poll_once(&settings).await {
                Ok(PollOutcome::Idle) => {
                    Self::idle(&shutdown, settings.poll_interval()).await;
                }
                Ok(outcome) => stats.record(&outcome),
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Job store unavailable, retrying at next poll");
                    Self::idle(&shutdown, settings.poll_interval()).await;
                }
            }
        }

        info!(
            worker_id = %self.id,
            completed = stats.completed,
            failed = stats.failed,
            dead = stats.dead,
            "Worker stopped"
        );
        stats
    }

    /// Runs a single poll cycle with the given configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns store errors from claiming or finalising. A job whose
    /// outcome could not be recorded stays `processing` until its claim
    /// goes stale.
    pub async fn poll_once(&self, settings: &QueueConfig) -> JobResult<PollOutcome> {
        self.recover_stale_claims(settings).await;

        let Some(job) = self.store.claim_next(&self.id).await? else {
            return Ok(PollOutcome::Idle);
        };

        self.process(job, settings).await
    }

    async fn idle(shutdown: &Shutdown, poll_interval: Duration) {
        tokio::select! {
            () = shutdown.wait() => {}
            () = tokio::time::sleep(poll_interval) => {}
        }
    }

    async fn refresh_settings(&self, current: QueueConfig) -> QueueConfig {
        match self.config.reload().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Failed to reload configuration, keeping previous values");
                current
            }
        }
    }

    async fn process(&self, job: Job, settings: &QueueConfig) -> JobResult<PollOutcome> {
        let claim = job
            .claim()
            .ok_or_else(|| JobError::Internal(format!("claimed job {} has no claim token", job.id)))?;
        let attempt = job.attempts.saturating_add(1);

        info!(
            job_id = %job.id,
            worker_id = %self.id,
            attempt,
            max_retries = job.max_retries,
            command = %job.command,
            "Processing job"
        );

        let started = Instant::now();
        let claim_ref = &claim;
        let outcome = self
            .executor
            .execute(&job.command, settings.heartbeat_interval(), move || {
                self.heartbeat(claim_ref)
            })
            .await;
        let elapsed = started.elapsed();

        let result = if outcome.is_success() {
            self.finalize(settings, || self.store.complete(&claim)).await
        } else {
            let update = Self::failure_update(&outcome, attempt, job.max_retries, settings);
            self.finalize(settings, || self.store.fail(&claim, &update))
                .await
        };

        match result {
            Ok(finished) => {
                self.report(&finished, attempt, elapsed);
                Ok(PollOutcome::Finished {
                    job_id: finished.id,
                    state: finished.state,
                })
            }
            Err(JobError::StaleClaim(_)) => {
                warn!(
                    job_id = %job.id,
                    worker_id = %self.id,
                    "Claim was reclaimed while the job ran; discarding this result"
                );
                Ok(PollOutcome::Abandoned { job_id: job.id })
            }
            Err(e) => {
                error!(job_id = %job.id, worker_id = %self.id, error = %e, "Failed to record job outcome");
                Err(e)
            }
        }
    }

    fn failure_update(
        outcome: &ExecutionOutcome,
        attempt: u32,
        max_retries: u32,
        settings: &QueueConfig,
    ) -> FailureUpdate {
        let error = outcome
            .error_message()
            .unwrap_or_else(|| "unknown failure".to_string());
        let decision = RetryPolicy::from_config(settings).decide(attempt, max_retries);
        FailureUpdate::from_decision(attempt, error, decision, Utc::now())
    }

    async fn heartbeat(&self, claim: &Claim) {
        match self.store.heartbeat(claim).await {
            Ok(()) => debug!(job_id = %claim.job_id, "Heartbeat"),
            Err(e) => warn!(job_id = %claim.job_id, error = %e, "Heartbeat failed"),
        }
    }

    /// Retries transient store errors; a lost claim is never retried.
    async fn finalize<F, Fut>(&self, settings: &QueueConfig, mut op: F) -> JobResult<Job>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = JobResult<Job>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < FINALIZE_ATTEMPTS => {
                    warn!(worker_id = %self.id, error = %e, attempt, "Retrying job finalisation");
                    tokio::time::sleep(settings.poll_interval()).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn report(&self, job: &Job, attempt: u32, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match job.state {
            JobState::Completed => {
                JobMetrics::job_completed(elapsed);
                info!(job_id = %job.id, worker_id = %self.id, attempt, elapsed_ms, "Job completed");
            }
            JobState::Dead => {
                JobMetrics::job_failed(attempt, elapsed);
                JobMetrics::job_dead_lettered("max_retries");
                warn!(
                    job_id = %job.id,
                    error = job.last_error.as_deref().unwrap_or_default(),
                    attempts = job.attempts,
                    "Moved job to dead letter queue"
                );
            }
            _ => {
                JobMetrics::job_failed(attempt, elapsed);
                let retry_in_ms = (job.next_eligible_at - Utc::now()).num_milliseconds().max(0);
                warn!(
                    job_id = %job.id,
                    error = job.last_error.as_deref().unwrap_or_default(),
                    attempt,
                    retry_in_ms,
                    "Job failed, will retry"
                );
            }
        }
    }

    /// Finalises claims whose owner stopped heartbeating as failed attempts.
    async fn recover_stale_claims(&self, settings: &QueueConfig) {
        let stale = match self.store.stale_claims(settings.stale_claim_threshold()).await {
            Ok(stale) => stale,
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Failed to check for stale claims");
                return;
            }
        };

        let threshold = settings.stale_claim_threshold();
        let policy = RetryPolicy::from_config(settings);
        for job in stale {
            let Some(claim) = job.claim() else {
                continue;
            };
            let owner = job.claimed_by.as_deref().unwrap_or("unknown");
            let attempts = job.attempts.saturating_add(1);
            let decision = policy.decide(attempts, job.max_retries);
            let update = FailureUpdate::from_decision(
                attempts,
                format!("claim expired: worker {owner} stopped heartbeating"),
                decision,
                Utc::now(),
            );

            match self.store.reclaim(&claim, &update, threshold).await {
                Ok(recovered) => {
                    JobMetrics::job_reclaimed();
                    if decision == RetryDecision::DeadLetter {
                        JobMetrics::job_dead_lettered("claim_expired");
                    }
                    warn!(
                        job_id = %recovered.id,
                        previous_owner = owner,
                        worker_id = %self.id,
                        state = %recovered.state,
                        "Recovered stale claim"
                    );
                }
                Err(JobError::StaleClaim(_)) => {
                    debug!(job_id = %job.id, "Stale claim resolved or owner heartbeated");
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Failed to recover stale claim");
                }
            }
        }
    }
}
