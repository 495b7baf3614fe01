//! HTTP implementation of the job capabilities

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobflow_core::{extract_token, extract_upload_url, JobHandle, JobStatus, StatusEnvelope};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::backend::{
    JobBackend, ObjectStore, PointsFetcher, SubmitRequest, SubmitSource, UploadReceipt,
};
use crate::config::ClientConfig;
use crate::credentials::CredentialsProvider;
use crate::error::{JobError, Result};
use crate::operation::Operation;

/// Authenticated HTTP access to the processing backend
///
/// Every request except login carries `Authorization: Bearer <token>` from the
/// credentials provider. A 401 from any endpoint clears the provider and
/// surfaces [`JobError::SessionExpired`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialsProvider>,
}

impl HttpBackend {
    pub fn new(config: ClientConfig, credentials: Arc<dyn CredentialsProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeouts.request_ms))
            .connect_timeout(Duration::from_millis(config.timeouts.connect_ms))
            .build()?;

        // Fail on a malformed base URL here rather than on the first request
        let base_url = Url::parse(&config.connection.base_url)?;
        info!("Job backend client created for {}", base_url);

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialsProvider> {
        &self.credentials
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Exchange a username and password for a token and store it
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let url = self.build_url(&self.config.endpoints.login)?;
        info!("Logging in as {} at {}", username, url);

        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(JobError::server_error(401, "invalid username or password"));
        }

        let body: Value = self.handle_response(response).await?;
        let token = extract_token(&body)?;
        self.credentials.store(&token)?;
        Ok(token)
    }

    // =========================================================================
    // Object store
    // =========================================================================

    /// Upload a local file as multipart field `file`
    #[instrument(skip(self))]
    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let token = self.require_token()?;
        let url = self.build_url(&self.config.endpoints.upload)?;

        let part = file_part(path).await?;
        info!("Uploading {} to {}", path.display(), url);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;

        let body: Value = self.handle_response(response).await?;
        Ok(UploadReceipt::new(extract_upload_url(&body)))
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Submit a processing request and return the raw response body
    #[instrument(skip(self, request), fields(operation = %request.operation))]
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Value> {
        let token = self.require_token()?;
        let operation = request.operation;
        let url = self.build_url(operation.submit_path())?;
        let mut fields = request.form_fields();

        let builder = self.client.post(url.clone()).bearer_auth(token);
        let builder = match &request.source {
            SubmitSource::Url(source) => {
                info!("Submitting {} for {} to {}", operation, source, url);
                fields.insert(operation.url_field().to_string(), source.clone());
                builder.form(&fields)
            }
            SubmitSource::File(path) => {
                info!("Submitting {} with inline {} to {}", operation, path.display(), url);
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (key, value)| form.text(key, value))
                    .part(operation.file_field(), file_part(path).await?);
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    /// Read the status of one job
    #[instrument(skip(self))]
    pub async fn status(&self, operation: Operation, job: &JobHandle) -> Result<JobStatus> {
        let token = self.require_token()?;
        let url = self.build_url(&operation.status_path(job.as_str()))?;
        debug!("Getting job status from {}", url);

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let envelope: StatusEnvelope = self.handle_response(response).await?;
        Ok(envelope.into())
    }

    /// Fetch the raw points cost table
    #[instrument(skip(self))]
    pub async fn points(&self) -> Result<Value> {
        let url = self.build_url(&self.config.endpoints.points_configs)?;
        debug!("Fetching points table from {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = self.credentials.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    fn build_url(&self, path: &str) -> Result<Url> {
        self.config.endpoint_url(path).map_err(Into::into)
    }

    fn require_token(&self) -> Result<String> {
        self.credentials.token().ok_or(JobError::SessionExpired)
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected the session token, clearing credentials");
            self.credentials.invalidate();
            return Err(JobError::SessionExpired);
        }

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| JobError::ParseError(e.to_string()))
        } else {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("HTTP {}", status));
            let message = error_message(&text).unwrap_or(text);
            Err(JobError::server_error(status.as_u16(), message))
        }
    }
}

/// `message` or `detail` from a JSON error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(String::from)
}

async fn file_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(data).file_name(file_name))
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit_job(&self, request: &SubmitRequest) -> Result<Value> {
        self.submit(request).await
    }

    async fn fetch_job_status(&self, operation: Operation, job: &JobHandle) -> Result<JobStatus> {
        self.status(operation, job).await
    }
}

#[async_trait]
impl ObjectStore for HttpBackend {
    async fn upload_object(&self, path: &Path) -> Result<UploadReceipt> {
        self.upload(path).await
    }
}

#[async_trait]
impl PointsFetcher for HttpBackend {
    async fn fetch_points(&self) -> Result<Value> {
        self.points().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentials;

    fn backend(base_url: &str) -> Result<HttpBackend> {
        HttpBackend::new(
            ClientConfig::builder(base_url).build(),
            Arc::new(MemoryCredentials::new()),
        )
    }

    #[test]
    fn test_backend_creation() {
        assert!(backend("http://localhost:8000/api").is_ok());
        assert!(matches!(
            backend("not a url"),
            Err(JobError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_build_url_keeps_prefix() {
        let backend = backend("http://localhost:8000/api").unwrap();
        let url = backend
            .build_url(&Operation::Inpaint.status_path("5"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/visual/task/5");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"message":"quota exceeded"}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            error_message(r#"{"detail":"Not authenticated"}"#).as_deref(),
            Some("Not authenticated")
        );
        assert_eq!(error_message("<html>"), None);
    }

    #[tokio::test]
    async fn test_requests_without_token_fail_fast() {
        let backend = backend("http://127.0.0.1:9").unwrap();
        let err = backend
            .status(Operation::Scale, &JobHandle::new("1"))
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
    }
}
