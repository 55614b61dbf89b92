//! Common test infrastructure for job store integration tests.

#![allow(dead_code)]

use chrono::Utc;
use queuectl_config::ConfigLoader;
use queuectl_jobs::{Claim, FailureUpdate, Job, JobStore, NewJob, SqliteJobStore};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary database wrapper.
///
/// Each instance owns a fresh directory holding the SQLite file (and its
/// WAL companions) plus an optional `config.json`.
pub struct TestDatabase {
    dir: TempDir,
    store: Arc<SqliteJobStore>,
}

impl TestDatabase {
    /// Creates a new, empty job store.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteJobStore::open(dir.path().join("queuectl.db"))
            .await
            .expect("Failed to open job store");

        Self {
            dir,
            store: Arc::new(store),
        }
    }

    /// Returns the shared store handle.
    pub fn store(&self) -> Arc<SqliteJobStore> {
        Arc::clone(&self.store)
    }

    /// Opens an independent handle with its own connection pool, the way
    /// a separate worker process would.
    pub async fn open_another(&self) -> SqliteJobStore {
        SqliteJobStore::open(self.db_path())
            .await
            .expect("Failed to reopen job store")
    }

    /// Path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("queuectl.db")
    }

    /// Writes `config.json` and returns a loader for it.
    pub fn config(&self, json: &str) -> ConfigLoader {
        let path = self.dir.path().join("config.json");
        std::fs::write(&path, json).expect("Failed to write config");
        ConfigLoader::new(path).expect("Failed to load config")
    }
}

/// Enqueues a job with an explicit id.
pub async fn enqueue(store: &SqliteJobStore, id: &str, command: &str) -> Job {
    store
        .enqueue(&NewJob::new(id, command), 3)
        .await
        .expect("Failed to enqueue")
}

/// Claims the next job, panicking if none is eligible.
pub async fn claim(store: &SqliteJobStore, worker: &str) -> (Job, Claim) {
    let job = store
        .claim_next(worker)
        .await
        .expect("Claim failed")
        .expect("No eligible job");
    let claim = job.claim().expect("Claimed job without token");
    (job, claim)
}

/// A failure that is immediately eligible for another claim.
pub fn retry_now(attempts: u32, error: &str) -> FailureUpdate {
    FailureUpdate {
        attempts,
        error: error.to_string(),
        next_eligible_at: Utc::now(),
        dead: false,
    }
}
