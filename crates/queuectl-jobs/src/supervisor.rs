//! Worker pool supervisor.
//!
//! Launches a fixed number of worker processes, each with its own store
//! connections. A worker's stdin is a pipe held by the supervisor;
//! closing it is the graceful stop request, and it also closes on its
//! own if the supervisor dies.

use crate::error::{JobError, JobResult};
use crate::shutdown::Shutdown;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker processes.
    pub count: u32,
    /// Executable launched for each worker.
    pub program: PathBuf,
    /// Arguments preceding `--index <n>`.
    pub args: Vec<OsString>,
    /// Pause before relaunching a worker that exited abnormally.
    pub restart_delay: Duration,
}

impl WorkerPoolConfig {
    /// Creates a configuration that launches `program args... --index <n>`.
    pub fn new(count: u32, program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            count,
            program: program.into(),
            args,
            restart_delay: Duration::from_secs(1),
        }
    }

    /// Sets the restart delay.
    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }
}

/// Lifetime counters of a pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker processes started, including restarts.
    pub launched: u64,
    /// Relaunches after an abnormal exit.
    pub restarted: u64,
    /// Exits with a non-zero status or by signal.
    pub abnormal_exits: u64,
}

impl PoolStats {
    fn merge(&mut self, other: PoolStats) {
        self.launched += other.launched;
        self.restarted += other.restarted;
        self.abnormal_exits += other.abnormal_exits;
    }
}

/// Supervises a fixed-size group of worker processes.
pub struct WorkerPool {
    config: Arc<WorkerPoolConfig>,
}

impl WorkerPool {
    /// Creates a new worker pool.
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Runs the pool until `shutdown` is triggered and every worker has exited.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker process cannot be launched; the
    /// remaining workers are stopped before returning.
    pub async fn run(&self, shutdown: Shutdown) -> JobResult<PoolStats> {
        info!(
            count = self.config.count,
            program = %self.config.program.display(),
            "Starting worker pool"
        );

        let mut slots = JoinSet::new();
        for index in 1..=self.config.count {
            slots.spawn(supervise(Arc::clone(&self.config), index, shutdown.clone()));
        }

        let mut stats = PoolStats::default();
        let mut first_error = None;
        while let Some(joined) = slots.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(JobError::Worker(e.to_string())));
            match result {
                Ok(slot) => stats.merge(slot),
                Err(e) => {
                    error!(error = %e, "Worker slot failed, stopping pool");
                    shutdown.trigger();
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(
            launched = stats.launched,
            restarted = stats.restarted,
            abnormal_exits = stats.abnormal_exits,
            "Worker pool stopped"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

fn launch(config: &WorkerPoolConfig, index: u32) -> JobResult<Child> {
    let child = Command::new(&config.program)
        .args(&config.args)
        .arg("--index")
        .arg(index.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;
    Ok(child)
}

/// Keeps one worker slot occupied until shutdown.
async fn supervise(config: Arc<WorkerPoolConfig>, index: u32, shutdown: Shutdown) -> JobResult<PoolStats> {
    let mut stats = PoolStats::default();

    loop {
        let mut child = launch(&config, index)?;
        stats.launched += 1;
        let pid = child.id();
        info!(index, pid, "Launched worker process");

        let status = wait_or_stop(&mut child, index, &shutdown).await?;

        if status.success() {
            info!(index, pid, "Worker process exited");
            return Ok(stats);
        }

        stats.abnormal_exits += 1;
        if shutdown.is_triggered() {
            warn!(index, pid, %status, "Worker process exited abnormally during shutdown");
            return Ok(stats);
        }

        warn!(index, pid, %status, "Worker process exited abnormally, restarting");
        tokio::select! {
            () = shutdown.wait() => return Ok(stats),
            () = tokio::time::sleep(config.restart_delay) => {}
        }
        stats.restarted += 1;
    }
}

/// Waits for the child, closing its stdin once shutdown is requested.
async fn wait_or_stop(child: &mut Child, index: u32, shutdown: &Shutdown) -> JobResult<ExitStatus> {
    let stdin = child.stdin.take();

    tokio::select! {
        status = child.wait() => Ok(status?),
        () = shutdown.wait() => {
            drop(stdin);
            info!(index, "Asked worker process to stop after its current job");
            Ok(child.wait().await?)
        }
    }
}
