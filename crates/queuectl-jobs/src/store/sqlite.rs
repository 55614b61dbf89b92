//! SQLite-backed job store.
//!
//! The database runs in WAL mode so readers never block the single
//! writer. Each process opens its own small pool; every operation below
//! is one statement, and SQLite takes the write lock before a write
//! statement reads anything, so the conditional updates are atomic
//! across processes.

use super::{FailureUpdate, JobStore};
use crate::error::{JobError, JobResult};
use crate::job::{Claim, Job, JobId, JobState, NewJob};
use crate::metrics::JobMetrics;
use crate::status::StatusSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::FromRow;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// How long a statement waits for the write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connections per process.
const MAX_CONNECTIONS: u32 = 4;

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS jobs (
        seq              INTEGER PRIMARY KEY AUTOINCREMENT,
        id               TEXT    NOT NULL UNIQUE,
        command          TEXT    NOT NULL,
        state            TEXT    NOT NULL
                         CHECK (state IN ('pending', 'processing', 'completed', 'failed', 'dead')),
        attempts         INTEGER NOT NULL DEFAULT 0,
        max_retries      INTEGER NOT NULL,
        next_eligible_at INTEGER NOT NULL,
        last_error       TEXT,
        claimed_by       TEXT,
        claim_token      TEXT,
        claimed_at       INTEGER,
        heartbeat_at     INTEGER,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (state, next_eligible_at, seq)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs (created_at)",
];

macro_rules! job_columns {
    () => {
        "id, command, state, attempts, max_retries, next_eligible_at, last_error, \
         claimed_by, claim_token, claimed_at, heartbeat_at, created_at, updated_at"
    };
}

/// Raw `jobs` row; timestamps are milliseconds since the Unix epoch.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    command: String,
    state: String,
    attempts: i64,
    max_retries: i64,
    next_eligible_at: i64,
    last_error: Option<String>,
    claimed_by: Option<String>,
    claim_token: Option<String>,
    claimed_at: Option<i64>,
    heartbeat_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            state: row.state.parse()?,
            attempts: to_count(row.attempts, "attempts")?,
            max_retries: to_count(row.max_retries, "max_retries")?,
            next_eligible_at: from_millis(row.next_eligible_at)?,
            claimed_at: row.claimed_at.map(from_millis).transpose()?,
            heartbeat_at: row.heartbeat_at.map(from_millis).transpose()?,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
            id: JobId::from(row.id),
            command: row.command,
            last_error: row.last_error,
            claimed_by: row.claimed_by,
            claim_token: row.claim_token,
        })
    }
}

fn to_count(value: i64, column: &str) -> JobResult<u32> {
    u32::try_from(value).map_err(|_| JobError::Internal(format!("{column} out of range: {value}")))
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(millis: i64) -> JobResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| JobError::Internal(format!("timestamp out of range: {millis}")))
}

/// Newest liveness timestamp a claim can have and still count as stale.
fn stale_cutoff(threshold: Duration) -> i64 {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    to_millis(Utc::now()).saturating_sub(threshold_ms)
}

fn into_jobs(rows: Vec<JobRow>) -> JobResult<Vec<Job>> {
    rows.into_iter().map(Job::try_from).collect()
}

/// Job store backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> JobResult<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        debug!(path = %path.display(), "job store opened");
        Ok(store)
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Creates the schema inside an immediate transaction so concurrent
    /// first-time opens serialize on the write lock.
    async fn migrate(&self) -> JobResult<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let mut result = Ok(());
        for statement in SCHEMA {
            if let Err(e) = sqlx::query(statement).execute(&mut *conn).await {
                result = Err(e);
                break;
            }
        }

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    debug!(error = %rollback, "rollback after failed migration also failed");
                    conn.close_on_drop();
                }
                Err(e.into())
            }
        }
    }

    /// Moves a claimed job to `failed` or `dead`.
    ///
    /// With a `stale_cutoff` the claim must also have gone without a
    /// heartbeat since that instant.
    async fn record_failure(
        &self,
        claim: &Claim,
        update: &FailureUpdate,
        stale_cutoff: Option<i64>,
    ) -> JobResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "UPDATE jobs \
             SET state = ?1, attempts = ?2, last_error = ?3, next_eligible_at = ?4, \
                 claim_token = NULL, heartbeat_at = NULL, updated_at = ?5 \
             WHERE id = ?6 AND state = 'processing' AND claim_token = ?7 \
               AND (?8 IS NULL OR COALESCE(heartbeat_at, claimed_at, updated_at) <= ?8) \
             RETURNING ",
            job_columns!()
        ))
        .bind(update.target_state().as_str())
        .bind(i64::from(update.attempts))
        .bind(&update.error)
        .bind(to_millis(update.next_eligible_at))
        .bind(to_millis(Utc::now()))
        .bind(claim.job_id.as_str())
        .bind(&claim.token)
        .bind(stale_cutoff)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.claim_lost(claim).await),
        }
    }

    /// Explains why a conditional update on a processing job matched no row.
    async fn claim_lost(&self, claim: &Claim) -> JobError {
        match self.get(&claim.job_id).await {
            Ok(Some(_)) => JobError::StaleClaim(claim.job_id.to_string()),
            Ok(None) => JobError::NotFound(claim.job_id.to_string()),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: &NewJob, default_max_retries: u32) -> JobResult<Job> {
        job.validate()?;
        let id = job.id_or_generate();
        let max_retries = job.max_retries.unwrap_or(default_max_retries);
        let now = to_millis(Utc::now());

        let row = sqlx::query_as::<_, JobRow>(concat!(
            "INSERT INTO jobs (id, command, state, attempts, max_retries, next_eligible_at, created_at, updated_at) \
             VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?4, ?4) \
             RETURNING ",
            job_columns!()
        ))
        .bind(id.as_str())
        .bind(&job.command)
        .bind(i64::from(max_retries))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                JobError::DuplicateId(id.to_string())
            }
            other => JobError::Database(other),
        })?;

        JobMetrics::job_enqueued();
        info!(job_id = %id, max_retries, "Enqueued job");
        Job::try_from(row)
    }

    async fn claim_next(&self, worker_id: &str) -> JobResult<Option<Job>> {
        let token = Uuid::new_v4().to_string();
        let now = to_millis(Utc::now());

        let row = sqlx::query_as::<_, JobRow>(concat!(
            "UPDATE jobs \
             SET state = 'processing', claimed_by = ?1, claim_token = ?2, \
                 claimed_at = ?3, heartbeat_at = ?3, updated_at = ?3 \
             WHERE seq = ( \
                 SELECT seq FROM jobs \
                 WHERE state IN ('pending', 'failed') AND next_eligible_at <= ?3 \
                 ORDER BY seq \
                 LIMIT 1 \
             ) \
             AND state IN ('pending', 'failed') \
             RETURNING ",
            job_columns!()
        ))
        .bind(worker_id)
        .bind(&token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job = Job::try_from(row)?;
        JobMetrics::job_claimed();
        debug!(job_id = %job.id, worker_id, attempts = job.attempts, "Claimed job");
        Ok(Some(job))
    }

    async fn heartbeat(&self, claim: &Claim) -> JobResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET heartbeat_at = ?1 \
             WHERE id = ?2 AND state = 'processing' AND claim_token = ?3",
        )
        .bind(to_millis(Utc::now()))
        .bind(claim.job_id.as_str())
        .bind(&claim.token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.claim_lost(claim).await);
        }
        Ok(())
    }

    async fn complete(&self, claim: &Claim) -> JobResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "UPDATE jobs \
             SET state = 'completed', attempts = attempts + 1, last_error = NULL, \
                 claim_token = NULL, heartbeat_at = NULL, updated_at = ?1 \
             WHERE id = ?2 AND state = 'processing' AND claim_token = ?3 \
             RETURNING ",
            job_columns!()
        ))
        .bind(to_millis(Utc::now()))
        .bind(claim.job_id.as_str())
        .bind(&claim.token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Job::try_from(row),
            None => Err(self.claim_lost(claim).await),
        }
    }

    async fn fail(&self, claim: &Claim, update: &FailureUpdate) -> JobResult<Job> {
        self.record_failure(claim, update, None).await
    }

    async fn get(&self, id: &JobId) -> JobResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            " FROM jobs WHERE id = ?1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list(&self, state: Option<JobState>) -> JobResult<Vec<Job>> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, JobRow>(concat!(
                    "SELECT ",
                    job_columns!(),
                    " FROM jobs WHERE state = ?1 ORDER BY created_at, seq"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>(concat!(
                    "SELECT ",
                    job_columns!(),
                    " FROM jobs ORDER BY created_at, seq"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_jobs(rows)
    }

    async fn dlq_retry(&self, id: &JobId) -> JobResult<Job> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, JobRow>(concat!(
            "UPDATE jobs \
             SET state = 'pending', attempts = 0, next_eligible_at = ?1, \
                 claimed_by = NULL, claimed_at = NULL, updated_at = ?1 \
             WHERE id = ?2 AND state = 'dead' \
             RETURNING ",
            job_columns!()
        ))
        .bind(now)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            JobMetrics::job_dlq_retried();
            info!(job_id = %id, "Moved job from dead letter queue back to pending");
            return Job::try_from(row);
        }

        match self.get(id).await? {
            Some(job) => Err(JobError::InvalidState {
                id: id.to_string(),
                expected: JobState::Dead.to_string(),
                actual: job.state.to_string(),
            }),
            None => Err(JobError::NotFound(id.to_string())),
        }
    }

    async fn stale_claims(&self, threshold: Duration) -> JobResult<Vec<Job>> {
        let cutoff = stale_cutoff(threshold);

        let rows = sqlx::query_as::<_, JobRow>(concat!(
            "SELECT ",
            job_columns!(),
            " FROM jobs \
             WHERE state = 'processing' AND COALESCE(heartbeat_at, claimed_at, updated_at) <= ?1 \
             ORDER BY seq"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn reclaim(
        &self,
        claim: &Claim,
        update: &FailureUpdate,
        threshold: Duration,
    ) -> JobResult<Job> {
        self.record_failure(claim, update, Some(stale_cutoff(threshold)))
            .await
    }

    async fn status_summary(&self) -> JobResult<StatusSummary> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let counts = rows
            .into_iter()
            .map(|(state, count)| {
                let state: JobState = state.parse()?;
                Ok((state, u64::try_from(count).unwrap_or_default()))
            })
            .collect::<JobResult<Vec<_>>>()?;

        Ok(StatusSummary::from_counts(counts))
    }
}
