//! Upload, submit and await a job as one call

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use jobflow_core::progress::{COMPLETE, POLL_RANGE, UPLOAD_RANGE};
use jobflow_core::{extract_job_handle, FailureKind, HandleShape, JobHandle, Outcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{JobBackend, ObjectStore, OperationStatus, SubmitRequest, SubmitSource};
use crate::credentials::CredentialsProvider;
use crate::error::{JobError, Result};
use crate::operation::Operation;
use crate::poller::{PollPolicy, Poller, ProgressSink};

/// Source material for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    /// Local file, uploaded to the object store first
    Local(PathBuf),
    /// Already stored; submitted by URL
    PreUploaded(String),
    /// Local file sent inside the submit request
    Inline(PathBuf),
}

/// What to run and on which asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    pub operation: Operation,
    pub asset: Asset,
    pub params: BTreeMap<String, String>,
}

impl SubmitOptions {
    pub fn new(operation: Operation, asset: Asset) -> Self {
        Self {
            operation,
            asset,
            params: BTreeMap::new(),
        }
    }

    /// Add an operation parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

fn emit(sink: Option<ProgressSink<'_>>, value: f64) {
    if let Some(sink) = sink {
        sink(value);
    }
}

/// Sequences upload, submission and polling for one job
///
/// Progress is forwarded on a single `[0, 1]` scale: the upload occupies
/// `[0, 0.3)`, polling `[0.3, 0.95)`, and `1.0` is reported once the job
/// resolves (unless it was cancelled).
#[derive(Debug)]
pub struct Orchestrator<B, O> {
    backend: B,
    store: O,
    credentials: Arc<dyn CredentialsProvider>,
    policy: PollPolicy,
}

impl<B: JobBackend, O: ObjectStore> Orchestrator<B, O> {
    pub fn new(
        backend: B,
        store: O,
        credentials: Arc<dyn CredentialsProvider>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            backend,
            store,
            credentials,
            policy,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Run a job to its terminal outcome.
    ///
    /// Missing credentials fail before any request is made. Transport errors
    /// abort the run; protocol violations resolve as [`Outcome::Failed`].
    #[instrument(skip(self, on_progress, cancel), fields(operation = %options.operation))]
    pub async fn run(
        &self,
        options: &SubmitOptions,
        on_progress: Option<ProgressSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if !self.credentials.is_present() {
            return Err(JobError::SessionExpired);
        }

        let source = match &options.asset {
            Asset::Local(path) => {
                emit(on_progress, UPLOAD_RANGE.remap(0.0));
                info!("Uploading {}", path.display());

                let receipt = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(Outcome::Cancelled { job: None }),
                    receipt = self.store.upload_object(path) => receipt?,
                };
                emit(on_progress, UPLOAD_RANGE.remap(0.5));

                match receipt.reference() {
                    Some(url) => SubmitSource::Url(url.to_string()),
                    None => {
                        warn!("Upload of {} returned no usable URL", path.display());
                        return Ok(self.finish(
                            Outcome::failed(None, FailureKind::UploadNoReference),
                            on_progress,
                        ));
                    }
                }
            }
            Asset::PreUploaded(url) => SubmitSource::Url(url.clone()),
            Asset::Inline(path) => SubmitSource::File(path.clone()),
        };

        let request =
            SubmitRequest::new(options.operation, source).with_params(options.params.clone());

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Outcome::Cancelled { job: None }),
            body = self.backend.submit_job(&request) => body?,
        };

        let job = match extract_job_handle(&body) {
            Ok((job, shape)) => {
                if shape == HandleShape::Nested {
                    debug!("Job handle found under data");
                }
                info!("Submitted {} as job {}", options.operation, job);
                job
            }
            Err(e) => {
                warn!("Submit response carried no job handle: {}", e);
                return Ok(self.finish(
                    Outcome::failed(None, FailureKind::NoJobHandle),
                    on_progress,
                ));
            }
        };

        let outcome = self
            .await_job(options.operation, &job, on_progress, cancel)
            .await?;
        Ok(self.finish(outcome, on_progress))
    }

    /// Poll an already submitted job, reporting progress in the polling range
    pub async fn await_job(
        &self,
        operation: Operation,
        job: &JobHandle,
        on_progress: Option<ProgressSink<'_>>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let poller = Poller::new(OperationStatus::new(&self.backend, operation), self.policy);
        let remap = |value: f64| emit(on_progress, POLL_RANGE.remap(value));
        poller.poll(job, Some(&remap), cancel).await
    }

    fn finish(&self, outcome: Outcome, on_progress: Option<ProgressSink<'_>>) -> Outcome {
        if !outcome.is_cancelled() {
            emit(on_progress, COMPLETE);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockJobBackend, MockObjectStore, UploadReceipt};
    use crate::credentials::MemoryCredentials;
    use jobflow_core::JobStatus;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn creds() -> Arc<dyn CredentialsProvider> {
        Arc::new(MemoryCredentials::with_token("t"))
    }

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(500), 5)
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(f64) + Send + Sync) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink_values = values.clone();
        (values, move |v| sink_values.lock().push(v))
    }

    fn done(result_ref: &str) -> JobStatus {
        JobStatus::new(1).with_progress(100.0).with_result_ref(result_ref)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_uploaded_skips_upload() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .withf(|req| req.source == SubmitSource::Url("http://cdn/a.png".into()))
            .times(1)
            .returning(|_| Ok(json!({ "task_id": "abc" })));
        backend
            .expect_fetch_job_status()
            .returning(|_, _| Ok(done("http://cdn/out.png")));

        let mut store = MockObjectStore::new();
        store.expect_upload_object().never();

        let orchestrator = Orchestrator::new(backend, store, creds(), policy());
        let (values, sink) = recorder();
        let options = SubmitOptions::new(
            Operation::Inpaint,
            Asset::PreUploaded("http://cdn/a.png".into()),
        );

        let outcome = orchestrator
            .run(&options, Some(&sink), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.result_ref(), Some("http://cdn/out.png"));
        let values = values.lock();
        assert!(values[0] >= 0.3);
        assert_eq!(values.last().copied(), Some(1.0));
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_asset_is_uploaded_then_submitted_by_url() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload_object()
            .times(1)
            .returning(|_| Ok(UploadReceipt::new(Some("https://cdn/up.png".into()))));

        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .withf(|req| req.source == SubmitSource::Url("https://cdn/up.png".into()))
            .times(1)
            .returning(|_| Ok(json!({ "code": 0, "data": { "taskId": "n1" } })));
        backend
            .expect_fetch_job_status()
            .withf(|_, job| job.as_str() == "n1")
            .returning(|_, _| Ok(done("https://cdn/out.png")));

        let orchestrator = Orchestrator::new(backend, store, creds(), policy());
        let (values, sink) = recorder();
        let options = SubmitOptions::new(Operation::Scale, Asset::Local("a.png".into()));

        let outcome = orchestrator
            .run(&options, Some(&sink), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.job().map(JobHandle::as_str), Some("n1"));
        let values = values.lock();
        assert_eq!(values[0], 0.0);
        assert!(values[1] > 0.0 && values[1] < 0.3, "upload stage: {}", values[1]);
        assert!(values[2] >= 0.3);
        assert_eq!(values.last().copied(), Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_asset_goes_into_submit() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .withf(|req| req.source == SubmitSource::File("doc.pdf".into()))
            .times(1)
            .returning(|_| Ok(json!({ "taskId": 7 })));
        backend
            .expect_fetch_job_status()
            .withf(|op, _| *op == Operation::PdfWatermark)
            .returning(|_, _| Ok(JobStatus::new(1).with_result_ref("http://x/out.pdf")));

        let mut store = MockObjectStore::new();
        store.expect_upload_object().never();

        let orchestrator = Orchestrator::new(backend, store, creds(), policy());
        let options =
            SubmitOptions::new(Operation::PdfWatermark, Asset::Inline("doc.pdf".into()));
        let outcome = orchestrator
            .run(&options, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.job().map(JobHandle::as_str), Some("7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_handle_is_a_failed_outcome() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .returning(|_| Ok(json!({ "code": 0, "message": "ok" })));
        backend.expect_fetch_job_status().never();

        let orchestrator = Orchestrator::new(backend, MockObjectStore::new(), creds(), policy());
        let (values, sink) = recorder();
        let options = SubmitOptions::new(
            Operation::Segment,
            Asset::PreUploaded("http://cdn/a.png".into()),
        );
        let outcome = orchestrator
            .run(&options, Some(&sink), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::NoJobHandle));
        assert_eq!(outcome.message(), Some("no job handle in response"));
        assert_eq!(*values.lock(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_without_reference() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload_object()
            .returning(|_| Ok(UploadReceipt::new(None)));

        let mut backend = MockJobBackend::new();
        backend.expect_submit_job().never();

        let orchestrator = Orchestrator::new(backend, store, creds(), policy());
        let options = SubmitOptions::new(Operation::Inpaint, Asset::Local("a.png".into()));
        let outcome = orchestrator
            .run(&options, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.failure_kind(), Some(FailureKind::UploadNoReference));
        assert_eq!(outcome.message(), Some("upload produced no reference"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credentials_fail_fast() {
        let mut backend = MockJobBackend::new();
        backend.expect_submit_job().never();
        let mut store = MockObjectStore::new();
        store.expect_upload_object().never();

        let orchestrator = Orchestrator::new(
            backend,
            store,
            Arc::new(MemoryCredentials::new()),
            policy(),
        );
        let options = SubmitOptions::new(Operation::Inpaint, Asset::Local("a.png".into()));
        let err = orchestrator
            .run(&options, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_error_propagates() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .returning(|_| Err(JobError::server_error(500, "boom")));

        let orchestrator = Orchestrator::new(backend, MockObjectStore::new(), creds(), policy());
        let options = SubmitOptions::new(
            Operation::Inpaint,
            Asset::PreUploaded("http://cdn/a.png".into()),
        );
        let err = orchestrator
            .run(&options, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_has_no_final_report() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .returning(|_| Ok(json!({ "task_id": "c1" })));
        backend
            .expect_fetch_job_status()
            .times(1)
            .returning(move |_, _| {
                trigger.cancel();
                Ok(JobStatus::new(0).with_progress(40.0))
            });

        let orchestrator = Orchestrator::new(backend, MockObjectStore::new(), creds(), policy());
        let (values, sink) = recorder();
        let options = SubmitOptions::new(
            Operation::Colorize,
            Asset::PreUploaded("http://cdn/a.png".into()),
        );
        let outcome = orchestrator
            .run(&options, Some(&sink), &cancel)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Cancelled {
                job: Some(JobHandle::new("c1"))
            }
        );
        assert!(!values.lock().contains(&1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_params_reach_the_request() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_submit_job()
            .withf(|req| {
                let fields = req.form_fields();
                fields.get("prompt").map(String::as_str) == Some("beach")
                    && fields.get("sync").map(String::as_str) == Some("0")
            })
            .times(1)
            .returning(|_| Ok(json!({ "task_id": "p1" })));
        backend
            .expect_fetch_job_status()
            .returning(|_, _| Ok(done("http://cdn/bg.png")));

        let orchestrator = Orchestrator::new(backend, MockObjectStore::new(), creds(), policy());
        let options = SubmitOptions::new(
            Operation::Background,
            Asset::PreUploaded("http://cdn/a.png".into()),
        )
        .param("prompt", "beach");
        let outcome = orchestrator
            .run(&options, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_success());
    }
}
