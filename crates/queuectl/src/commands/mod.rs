//! CLI command implementations.

pub mod config;
pub mod dlq;
pub mod jobs;
pub mod worker;

use anyhow::{Context as _, Result};
use queuectl_config::ConfigLoader;
use queuectl_jobs::{Job, SqliteJobStore};
use std::path::{Path, PathBuf};

/// Resolved inputs shared by every command.
pub struct Context {
    loader: ConfigLoader,
    config_path: PathBuf,
    db_path: PathBuf,
}

impl Context {
    pub fn new(loader: ConfigLoader, config_path: PathBuf, db_path: PathBuf) -> Self {
        Self {
            loader,
            config_path,
            db_path,
        }
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Opens the job store, creating the database on first use.
    pub async fn open_store(&self) -> Result<SqliteJobStore> {
        SqliteJobStore::open(&self.db_path)
            .await
            .with_context(|| format!("failed to open job store at {}", self.db_path.display()))
    }
}

/// Prints job records as a pretty JSON array.
fn print_jobs(jobs: &[Job]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(jobs)?);
    Ok(())
}
