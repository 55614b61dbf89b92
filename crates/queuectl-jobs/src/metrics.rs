//! Metrics for job queue monitoring.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the job queue.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "queuectl_jobs_enqueued_total";
    /// Total jobs claimed by a worker.
    pub const JOBS_CLAIMED_TOTAL: &str = "queuectl_jobs_claimed_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "queuectl_jobs_completed_total";
    /// Total failed attempts.
    pub const JOBS_FAILED_TOTAL: &str = "queuectl_jobs_failed_total";
    /// Total jobs sent to the dead letter queue.
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "queuectl_jobs_dead_lettered_total";
    /// Total abandoned claims recovered from crashed workers.
    pub const JOBS_RECLAIMED_TOTAL: &str = "queuectl_jobs_reclaimed_total";
    /// Total jobs moved out of the dead letter queue.
    pub const JOBS_DLQ_RETRIED_TOTAL: &str = "queuectl_jobs_dlq_retried_total";

    /// Command execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "queuectl_job_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_CLAIMED_TOTAL,
        "Total number of jobs claimed for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of failed execution attempts"
    );
    describe_counter!(
        names::JOBS_DEAD_LETTERED_TOTAL,
        "Total number of jobs sent to dead letter queue"
    );
    describe_counter!(
        names::JOBS_RECLAIMED_TOTAL,
        "Total number of stale claims recovered"
    );
    describe_counter!(
        names::JOBS_DLQ_RETRIED_TOTAL,
        "Total number of dead jobs moved back to pending"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job command execution duration in seconds"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued() {
        counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
    }

    /// Record a job claimed.
    pub fn job_claimed() {
        counter!(names::JOBS_CLAIMED_TOTAL).increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "completed")
            .record(duration.as_secs_f64());
    }

    /// Record a failed attempt.
    pub fn job_failed(attempt: u32, duration: Duration) {
        counter!(names::JOBS_FAILED_TOTAL, "attempt" => attempt.to_string()).increment(1);
        histogram!(names::JOB_DURATION_SECONDS, "status" => "failed")
            .record(duration.as_secs_f64());
    }

    /// Record a job sent to DLQ.
    pub fn job_dead_lettered(reason: &'static str) {
        counter!(names::JOBS_DEAD_LETTERED_TOTAL, "reason" => reason).increment(1);
    }

    /// Record a stale claim recovered.
    pub fn job_reclaimed() {
        counter!(names::JOBS_RECLAIMED_TOTAL).increment(1);
    }

    /// Record a job retried out of the DLQ.
    pub fn job_dlq_retried() {
        counter!(names::JOBS_DLQ_RETRIED_TOTAL).increment(1);
    }
}
