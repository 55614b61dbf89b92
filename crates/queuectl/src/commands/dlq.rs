//! Dead letter queue commands.

use super::{print_jobs, Context};
use anyhow::Result;
use queuectl_jobs::{JobId, JobState, JobStore};

pub async fn list(ctx: &Context) -> Result<()> {
    let store = ctx.open_store().await?;
    let jobs = store.list(Some(JobState::Dead)).await?;
    store.close().await;

    print_jobs(&jobs)
}

pub async fn retry(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.open_store().await?;
    let job = store.dlq_retry(&JobId::from(id)).await?;
    store.close().await;

    println!("Job {} moved back to pending", job.id);
    Ok(())
}
