//! Status command - single status read

use anyhow::{Context, Result};
use jobflow_client::{JobClient, JobHandle, JobState, Operation};
use jobflow_core::ProgressRange;

use crate::output::{OutputContext, StatusRow};

/// Read a job's status once
pub async fn status(
    client: &JobClient,
    operation: Operation,
    job: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let job = JobHandle::new(job);
    let status = client
        .fetch_status(operation, &job)
        .await
        .with_context(|| format!("Failed to read status of job {}", job))?;

    let state = match status.decoded() {
        JobState::Pending => "pending".to_string(),
        JobState::Completed => "completed".to_string(),
        JobState::Failed(kind) => format!("failed: {}", kind.message()),
    };

    ctx.print_one(&StatusRow {
        job: job.to_string(),
        state,
        code: status.state,
        progress: status
            .progress
            .map(|p| format!("{:.0}%", ProgressRange::UNIT.remap_percent(p) * 100.0))
            .unwrap_or_else(|| "-".to_string()),
        result: status.result_ref.unwrap_or_default(),
    });
    Ok(())
}
