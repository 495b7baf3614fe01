//! Fixed-cadence status polling with a bounded attempt budget

use std::time::Duration;

use jobflow_core::{FailureKind, JobHandle, JobState, JobStatus, Outcome, ProgressRange};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::StatusSource;
use crate::config::PollingConfig;
use crate::error::Result;

/// Caller-supplied progress sink; values are always in `[0, 1]`
pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Cadence and budget of a poll session
///
/// The timeout is the attempt budget, not a wall clock: a session ends after
/// `max_attempts` pending reads no matter how long each read took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self::new(Duration::from_millis(config.interval_ms), config.max_attempts)
    }
}

/// Bookkeeping for one job's poll loop
#[derive(Debug)]
struct PollSession<'a> {
    job: &'a JobHandle,
    attempt_count: u32,
    max_attempts: u32,
}

impl<'a> PollSession<'a> {
    fn new(job: &'a JobHandle, policy: &PollPolicy) -> Self {
        Self {
            job,
            attempt_count: 0,
            // A zero budget still allows the first read
            max_attempts: policy.max_attempts.max(1),
        }
    }

    /// Count a pending read; returns true once the budget is spent
    fn record_pending(&mut self) -> bool {
        self.attempt_count += 1;
        self.attempt_count >= self.max_attempts
    }

    fn cancelled(&self) -> Outcome {
        info!("Polling of job {} cancelled after {} attempts", self.job, self.attempt_count);
        Outcome::Cancelled {
            job: Some(self.job.clone()),
        }
    }

    fn timed_out(&self) -> Outcome {
        warn!("Job {} still pending after {} attempts", self.job, self.attempt_count);
        Outcome::TimedOut {
            job: self.job.clone(),
            attempts: self.attempt_count,
        }
    }

    /// Terminal outcome for a completed or failed status, `None` while pending
    fn resolve(&self, status: JobStatus) -> Option<Outcome> {
        match status.decoded() {
            JobState::Completed => Some(match status.result_ref {
                Some(result_ref) if !result_ref.trim().is_empty() => {
                    info!("Job {} completed: {}", self.job, result_ref);
                    Outcome::Succeeded {
                        job: self.job.clone(),
                        result_ref,
                    }
                }
                _ => {
                    warn!("Job {} completed without a result reference", self.job);
                    Outcome::failed(Some(self.job.clone()), FailureKind::MissingResultRef)
                }
            }),
            JobState::Failed(kind) => {
                warn!("Job {} failed: {}", self.job, kind);
                Some(Outcome::failed(Some(self.job.clone()), kind))
            }
            JobState::Pending => None,
        }
    }
}

/// Polls one status source until a job resolves
#[derive(Debug)]
pub struct Poller<S> {
    source: S,
    policy: PollPolicy,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(source: S, policy: PollPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `job` until it completes, fails, exhausts the budget or is cancelled.
    ///
    /// Progress is reported on the unit scale, starting with `0`. A transport
    /// error aborts the session and is returned as `Err` without retrying.
    #[instrument(skip(self, on_progress, cancel))]
    pub async fn poll(
        &self,
        job: &JobHandle,
        on_progress: Option<ProgressSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut session = PollSession::new(job, &self.policy);
        let report = |value: f64| {
            if let Some(sink) = on_progress {
                sink(value);
            }
        };

        report(ProgressRange::UNIT.remap(0.0));

        loop {
            if cancel.is_cancelled() {
                return Ok(session.cancelled());
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(session.cancelled()),
                status = self.source.fetch_status(job) => status?,
            };

            if let Some(raw) = status.progress {
                report(ProgressRange::UNIT.remap_percent(raw));
            }

            if let Some(outcome) = session.resolve(status) {
                return Ok(outcome);
            }

            if session.record_pending() {
                return Ok(session.timed_out());
            }

            debug!(
                "Job {} pending (attempt {}/{})",
                job, session.attempt_count, session.max_attempts
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(session.cancelled()),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }
}
