//! Submit and poll commands - run a job to completion with a progress bar

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use jobflow_client::{
    Asset, CancellationToken, JobClient, JobHandle, JobRequest, Operation, Outcome,
};

use crate::output::{OutcomeRow, OutputContext};

/// Submit a job and wait for its outcome
pub async fn submit(
    client: &JobClient,
    operation: Operation,
    source: &str,
    inline: bool,
    params: &[(String, String)],
    ctx: &OutputContext,
) -> Result<()> {
    let asset = asset_for(source, inline)?;

    if let Some(cost) = client.points_cost(operation).await {
        ctx.info(&format!("{} costs {} points", operation, cost));
    }

    let cancel = cancel_on_ctrlc()?;
    let bar = progress_bar(ctx)?;

    let mut request = JobRequest::new(operation, asset).cancel_with(cancel);
    for (key, value) in params {
        request = request.param(key, value);
    }
    if let Some(bar) = &bar {
        bar_message(bar, &format!("Running {}...", operation));
        let sink = bar.clone();
        request = request.on_progress(move |p| sink.set_position(percent(p)));
    }

    let outcome = client
        .submit_and_await(request)
        .await
        .with_context(|| format!("Failed to run {}", operation))?;

    finish(bar, &outcome);
    report(&outcome, ctx)
}

/// Wait for a job submitted earlier
pub async fn poll(
    client: &JobClient,
    operation: Operation,
    job: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let job = JobHandle::new(job);
    let cancel = cancel_on_ctrlc()?;
    let bar = progress_bar(ctx)?;

    let on_progress = bar.clone().map(|bar| {
        bar_message(&bar, &format!("Waiting for job {}...", job));
        std::sync::Arc::new(move |p: f64| bar.set_position(percent(p)))
            as jobflow_client::ProgressCallback
    });

    let outcome = client
        .await_job(operation, &job, on_progress, Some(cancel))
        .await
        .with_context(|| format!("Failed to poll job {}", job))?;

    finish(bar, &outcome);
    report(&outcome, ctx)
}

/// URLs are submitted as-is; anything else must be a local file
fn asset_for(source: &str, inline: bool) -> Result<Asset> {
    if source.starts_with("http://") || source.starts_with("https://") {
        if inline {
            bail!("--inline needs a local file, got a URL");
        }
        return Ok(Asset::PreUploaded(source.to_string()));
    }

    let path = PathBuf::from(source);
    if !path.is_file() {
        bail!("Source file not found: {}", path.display());
    }

    Ok(if inline {
        Asset::Inline(path)
    } else {
        Asset::Local(path)
    })
}

fn cancel_on_ctrlc() -> Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel()).context("Failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn progress_bar(ctx: &OutputContext) -> Result<Option<ProgressBar>> {
    if !ctx.interactive() {
        return Ok(None);
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("=>-"),
    );
    Ok(Some(bar))
}

fn bar_message(bar: &ProgressBar, msg: &str) {
    bar.set_message(msg.to_string());
}

fn percent(progress: f64) -> u64 {
    (progress * 100.0).round() as u64
}

fn finish(bar: Option<ProgressBar>, outcome: &Outcome) {
    if let Some(bar) = bar {
        match outcome {
            Outcome::Succeeded { .. } => bar.finish_with_message("Complete!"),
            Outcome::Cancelled { .. } => bar.abandon_with_message("Cancelled"),
            _ => bar.abandon_with_message("Failed"),
        }
    }
}

fn outcome_name(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Succeeded { .. } => "succeeded",
        Outcome::Failed { .. } => "failed",
        Outcome::TimedOut { .. } => "timed out",
        Outcome::Cancelled { .. } => "cancelled",
    }
}

/// Print the outcome; failures and timeouts become a non-zero exit
fn report(outcome: &Outcome, ctx: &OutputContext) -> Result<()> {
    ctx.print_one(&OutcomeRow {
        job: outcome.job().map(JobHandle::to_string).unwrap_or_default(),
        outcome: outcome_name(outcome).to_string(),
        result: outcome.result_ref().unwrap_or_default().to_string(),
        message: outcome.message().unwrap_or_default().to_string(),
    });

    match outcome {
        Outcome::Succeeded { .. } => Ok(()),
        Outcome::Cancelled { job } => {
            if let Some(job) = job {
                ctx.warn(&format!(
                    "Stopped waiting; job {} may still finish on the server",
                    job
                ));
            }
            Ok(())
        }
        _ => bail!(
            "Job did not succeed: {}",
            outcome.message().unwrap_or("unknown error")
        ),
    }
}
