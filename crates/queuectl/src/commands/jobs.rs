//! Enqueueing and inspecting jobs.

use super::{print_jobs, Context};
use anyhow::Result;
use queuectl_jobs::{JobState, JobStore, NewJob};

pub async fn enqueue(ctx: &Context, description: &str) -> Result<()> {
    let job = NewJob::from_json(description)?;
    let config = ctx.loader().get().await;

    let store = ctx.open_store().await?;
    let job = store.enqueue(&job, config.max_retries).await?;
    store.close().await;

    println!("Enqueued job {}", job.id);
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let store = ctx.open_store().await?;
    let summary = store.status_summary().await?;
    store.close().await;

    println!("{summary}");
    Ok(())
}

pub async fn list(ctx: &Context, state: Option<&str>) -> Result<()> {
    let state = state.map(str::parse::<JobState>).transpose()?;

    let store = ctx.open_store().await?;
    let jobs = store.list(state).await?;
    store.close().await;

    print_jobs(&jobs)
}
