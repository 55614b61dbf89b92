//! Worker commands.

use super::Context;
use anyhow::{Context as _, Result};
use queuectl_jobs::{worker_id, Shutdown, Worker, WorkerPool, WorkerPoolConfig};
use std::ffi::OsString;
use std::sync::Arc;
use tracing::info;

/// Supervises `count` worker processes until interrupted.
pub async fn start(ctx: &Context, count: u32) -> Result<()> {
    // Create the schema once up front rather than racing N first opens.
    ctx.open_store().await?.close().await;

    let program = std::env::current_exe().context("failed to locate the queuectl executable")?;
    let args: Vec<OsString> = vec![
        "--config".into(),
        ctx.config_path().into(),
        "--db".into(),
        ctx.db_path().into(),
        "worker".into(),
        "run".into(),
        "--supervised".into(),
    ];

    let shutdown = Shutdown::new();
    shutdown
        .listen_for_signals()
        .context("failed to install signal handlers")?;

    let pool = WorkerPool::new(WorkerPoolConfig::new(count, program, args));
    let stats = pool.run(shutdown).await?;

    info!(
        launched = stats.launched,
        restarted = stats.restarted,
        "All workers stopped"
    );
    Ok(())
}

/// Runs one worker in this process.
pub async fn run(ctx: &Context, index: u32, supervised: bool) -> Result<()> {
    let shutdown = Shutdown::new();
    shutdown
        .listen_for_signals()
        .context("failed to install signal handlers")?;
    if supervised {
        shutdown
            .listen_for_stdin_eof()
            .context("failed to watch the control channel")?;
    }

    let store = Arc::new(ctx.open_store().await?);
    let worker = Worker::new(worker_id(index), Arc::clone(&store), ctx.loader().clone());
    worker.run(shutdown).await;

    store.close().await;
    Ok(())
}
