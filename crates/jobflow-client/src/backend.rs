//! Capabilities the poller and orchestrator consume
//!
//! [`crate::HttpBackend`] implements all of them over HTTP; tests substitute
//! mocks or the in-process [`crate::testing::FakeJobServer`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobflow_core::{JobHandle, JobStatus};
use serde_json::Value;

use crate::error::Result;
use crate::operation::Operation;

// =============================================================================
// Requests and receipts
// =============================================================================

/// Where the submitted source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitSource {
    /// Publicly addressable URL the backend fetches itself
    Url(String),
    /// Local file sent inline as multipart
    File(PathBuf),
}

/// A processing request for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub operation: Operation,
    pub source: SubmitSource,
    pub params: BTreeMap<String, String>,
}

impl SubmitRequest {
    pub fn new(operation: Operation, source: SubmitSource) -> Self {
        Self {
            operation,
            source,
            params: BTreeMap::new(),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Form fields sent alongside the source
    pub fn form_fields(&self) -> BTreeMap<String, String> {
        self.operation.form_fields(&self.params)
    }
}

/// Result of storing an object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: Option<String>,
}

impl UploadReceipt {
    pub fn new(url: Option<String>) -> Self {
        Self { url }
    }

    /// Resolvable reference: a non-empty absolute http(s) URL
    pub fn reference(&self) -> Option<&str> {
        let url = self.url.as_deref()?.trim();
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Some(url),
            _ => None,
        }
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Reads the status of one job
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job: &JobHandle) -> Result<JobStatus>;
}

/// Accepts processing requests and reports job status
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Submit a job; the raw body is returned so the caller can locate the handle
    async fn submit_job(&self, request: &SubmitRequest) -> Result<Value>;

    async fn fetch_job_status(&self, operation: Operation, job: &JobHandle) -> Result<JobStatus>;
}

/// Stores a local file and returns where it can be fetched
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_object(&self, path: &Path) -> Result<UploadReceipt>;
}

/// Fetches the raw points cost table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PointsFetcher: Send + Sync {
    async fn fetch_points(&self) -> Result<Value>;
}

/// Status reads for jobs of a single operation
#[derive(Debug)]
pub struct OperationStatus<'a, B: ?Sized> {
    backend: &'a B,
    operation: Operation,
}

impl<'a, B: JobBackend + ?Sized> OperationStatus<'a, B> {
    pub fn new(backend: &'a B, operation: Operation) -> Self {
        Self { backend, operation }
    }
}

#[async_trait]
impl<B: JobBackend + ?Sized> StatusSource for OperationStatus<'_, B> {
    async fn fetch_status(&self, job: &JobHandle) -> Result<JobStatus> {
        self.backend.fetch_job_status(self.operation, job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_reference() {
        let ok = UploadReceipt::new(Some("https://cdn.example.com/a.png".into()));
        assert_eq!(ok.reference(), Some("https://cdn.example.com/a.png"));

        assert_eq!(UploadReceipt::new(None).reference(), None);
        assert_eq!(UploadReceipt::new(Some("".into())).reference(), None);
        assert_eq!(UploadReceipt::new(Some("not a url".into())).reference(), None);
        assert_eq!(UploadReceipt::new(Some("ftp://h/a.png".into())).reference(), None);
    }

    #[test]
    fn test_request_form_fields_force_async() {
        let request = SubmitRequest::new(
            Operation::Scale,
            SubmitSource::Url("http://x/a.png".into()),
        );
        let fields = request.form_fields();
        assert_eq!(fields.get("sync").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_operation_status_routes_operation() {
        let mut backend = MockJobBackend::new();
        backend
            .expect_fetch_job_status()
            .withf(|op, job| *op == Operation::PdfWatermark && job.as_str() == "9")
            .times(1)
            .returning(|_, _| Ok(JobStatus::new(0)));

        let source = OperationStatus::new(&backend, Operation::PdfWatermark);
        let status = source.fetch_status(&JobHandle::new("9")).await.unwrap();
        assert_eq!(status.state, 0);
    }
}
