//! Queuectl Jobs - Persistent Background Job Queue
//!
//! A single-machine job queue backed by SQLite with:
//! - Shell commands as opaque job payloads
//! - Atomic claims shared safely by independent worker processes
//! - Exponential backoff retries and a dead letter queue
//! - Heartbeat-based recovery of jobs abandoned by crashed workers
//! - A supervisor that runs a fixed pool of isolated worker processes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Worker Pool Supervisor                    │
//! │        spawns N processes, closes their stdin to stop        │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Worker 1 │       │ Worker 2 │       │ Worker N │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        │  claim → execute → complete / fail   │
//!        ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Job Store (SQLite, WAL)                     │
//! │  pending ─► processing ─► completed                          │
//! │     ▲           │                                            │
//! │     │           ├─► failed ─(backoff elapsed)─► processing   │
//! │     │           └─► dead ─(dlq retry)─► pending              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use queuectl_config::ConfigLoader;
//! use queuectl_jobs::{worker_id, JobStore, NewJob, Shutdown, SqliteJobStore, Worker};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteJobStore::open("queuectl.db").await?);
//! store.enqueue(&NewJob::new("report", "./make-report.sh"), 3).await?;
//!
//! let worker = Worker::new(worker_id(1), store, ConfigLoader::new("config.json")?);
//! worker.run(Shutdown::new()).await;
//! ```

pub mod error;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod retry;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod worker;

pub use error::{JobError, JobResult};
pub use executor::{ExecutionOutcome, ShellExecutor};
pub use job::{Claim, Job, JobId, JobState, NewJob};
pub use metrics::{register_metrics, JobMetrics};
pub use retry::{backoff, should_dead_letter, RetryDecision, RetryPolicy, BACKOFF_CAP};
pub use shutdown::Shutdown;
pub use status::StatusSummary;
pub use store::{FailureUpdate, JobStore, SqliteJobStore};
pub use supervisor::{PoolStats, WorkerPool, WorkerPoolConfig};
pub use worker::{worker_id, PollOutcome, Worker, WorkerStats};
