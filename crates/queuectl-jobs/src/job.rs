//! Job definitions and lifecycle states.

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a short random job ID of the form `job-1a2b3c4d`.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("job-{}", &uuid[..8]))
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its first claim.
    Pending,
    /// Held by exactly one worker.
    Processing,
    /// Finished with exit status zero.
    Completed,
    /// Failed and waiting out its backoff before the next claim.
    Failed,
    /// Exhausted its retries; only a DLQ retry brings it back.
    Dead,
}

impl JobState {
    /// Every state, in lifecycle order.
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    /// Returns the persisted name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    /// Returns true if workers never pick the job up again on their own.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| JobError::InvalidJob(format!("unknown job state '{s}'")))
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub next_eligible_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    #[serde(skip_serializing)]
    pub claim_token: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Returns the claim held on this job, if it is being processed.
    #[must_use]
    pub fn claim(&self) -> Option<Claim> {
        match (self.state, &self.claim_token) {
            (JobState::Processing, Some(token)) => Some(Claim {
                job_id: self.id.clone(),
                token: token.clone(),
            }),
            _ => None,
        }
    }
}

/// Proof of ownership of a processing job.
///
/// Finalising a job requires the token issued when it was claimed, so a
/// worker whose claim was reclaimed cannot overwrite the newer outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub job_id: JobId,
    pub token: String,
}

/// A job description submitted for enqueueing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewJob {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<JobId>,

    /// Shell command to run.
    #[serde(default)]
    pub command: String,

    /// Per-job attempt ceiling; the configured default applies when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl NewJob {
    /// Creates a job description with an explicit id.
    pub fn new(id: impl Into<JobId>, command: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            command: command.into(),
            max_retries: None,
        }
    }

    /// Sets the per-job attempt ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parses and validates a JSON job description.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidJob`] if the JSON is malformed or the
    /// description is incomplete.
    pub fn from_json(json: &str) -> JobResult<Self> {
        let job: NewJob =
            serde_json::from_str(json).map_err(|e| JobError::InvalidJob(e.to_string()))?;
        job.validate()?;
        Ok(job)
    }

    /// Checks that the description can be enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidJob`] for an empty id or command.
    pub fn validate(&self) -> JobResult<()> {
        if self.command.trim().is_empty() {
            return Err(JobError::InvalidJob("command must not be empty".to_string()));
        }
        if self.id.as_ref().is_some_and(|id| id.as_str().trim().is_empty()) {
            return Err(JobError::InvalidJob("id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the job id, generating one if none was supplied.
    #[must_use]
    pub fn id_or_generate(&self) -> JobId {
        self.id.clone().unwrap_or_else(JobId::generate)
    }
}
