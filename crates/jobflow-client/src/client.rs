//! High-level job client

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jobflow_core::{JobHandle, JobStatus, Outcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::ClientConfig;
use crate::credentials::{CredentialsProvider, MemoryCredentials};
use crate::error::{JobError, Result};
use crate::http::HttpBackend;
use crate::operation::Operation;
use crate::orchestrator::{Asset, Orchestrator, SubmitOptions};
use crate::points::{PointsCatalog, PointsLookup};
use crate::poller::PollPolicy;

/// Shared progress callback
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// A job to submit, with its optional progress sink and cancellation token
#[derive(Clone)]
pub struct JobRequest {
    pub options: SubmitOptions,
    on_progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
}

impl JobRequest {
    pub fn new(operation: Operation, asset: Asset) -> Self {
        Self::from_options(SubmitOptions::new(operation, asset))
    }

    pub fn from_options(options: SubmitOptions) -> Self {
        Self {
            options,
            on_progress: None,
            cancel: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.param(key, value);
        self
    }

    /// Receive progress reports in `[0, 1]`
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Abandon the job when `token` is cancelled
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("options", &self.options)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Client for submitting jobs to the processing backend and awaiting them
///
/// # Example
///
/// ```rust,no_run
/// use jobflow_client::{Asset, ClientConfig, JobClient, JobRequest, Operation};
///
/// # async fn run() -> jobflow_client::Result<()> {
/// let client = JobClient::new(ClientConfig::builder("http://localhost:8000/api").build())?;
/// client.login("alice", "secret").await?;
///
/// let request = JobRequest::new(Operation::Inpaint, Asset::Local("photo.png".into()))
///     .on_progress(|p| println!("{:.0}%", p * 100.0));
/// let outcome = client.submit_and_await(request).await?;
/// println!("{:?}", outcome.result_ref());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JobClient {
    orchestrator: Orchestrator<HttpBackend, HttpBackend>,
    credentials: Arc<dyn CredentialsProvider>,
    points: PointsCatalog,
}

impl JobClient {
    /// Create a client with in-memory credentials seeded from the config token
    pub fn new(config: ClientConfig) -> Result<Self> {
        let credentials: Arc<dyn CredentialsProvider> = match &config.connection.token {
            Some(token) => Arc::new(MemoryCredentials::with_token(token.clone())),
            None => Arc::new(MemoryCredentials::new()),
        };
        Self::with_credentials(config, credentials)
    }

    /// Create a client backed by an explicit credentials provider
    pub fn with_credentials(
        config: ClientConfig,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self> {
        let policy = PollPolicy::from(&config.polling);
        let points = PointsCatalog::new(Duration::from_millis(config.points.cache_ttl_ms));
        let backend = HttpBackend::new(config, credentials.clone())?;

        Ok(Self {
            orchestrator: Orchestrator::new(backend.clone(), backend, credentials.clone(), policy),
            credentials,
            points,
        })
    }

    /// Create a client from a YAML config file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let config =
            ClientConfig::from_yaml_file(path).map_err(|e| JobError::ConfigError(e.to_string()))?;
        Self::new(config)
    }

    /// Create a client from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = ClientConfig::from_yaml(yaml).map_err(|e| JobError::ConfigError(e.to_string()))?;
        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        self.backend().config()
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialsProvider> {
        &self.credentials
    }

    fn backend(&self) -> &HttpBackend {
        self.orchestrator.backend()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Log in and store the issued token
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.backend().login(username, password).await?;
        self.points.clear();
        info!("Logged in as {}", username);
        Ok(())
    }

    /// Forget the stored token and the points table fetched under it
    pub fn logout(&self) {
        self.credentials.invalidate();
        self.points.clear();
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_present()
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Upload (if needed), submit and poll a job to its terminal outcome
    #[instrument(skip(self, request), fields(operation = %request.options.operation))]
    pub async fn submit_and_await(&self, request: JobRequest) -> Result<Outcome> {
        let cancel = request.cancel.unwrap_or_default();
        self.orchestrator
            .run(&request.options, request.on_progress.as_deref(), &cancel)
            .await
    }

    /// Read a job's status once, without polling
    pub async fn fetch_status(&self, operation: Operation, job: &JobHandle) -> Result<JobStatus> {
        if !self.credentials.is_present() {
            return Err(JobError::SessionExpired);
        }
        self.backend().status(operation, job).await
    }

    /// Poll a job submitted earlier until it resolves
    pub async fn await_job(
        &self,
        operation: Operation,
        job: &JobHandle,
        on_progress: Option<ProgressCallback>,
        cancel: Option<CancellationToken>,
    ) -> Result<Outcome> {
        if !self.credentials.is_present() {
            return Err(JobError::SessionExpired);
        }
        let cancel = cancel.unwrap_or_default();
        self.orchestrator
            .await_job(operation, job, on_progress.as_deref(), &cancel)
            .await
    }

    // =========================================================================
    // Points
    // =========================================================================

    /// Points cost table, served from cache within its TTL
    pub async fn points(&self, force_refresh: bool) -> PointsLookup {
        self.points.get(self.backend(), force_refresh).await
    }

    /// Points charged for one operation, if the table lists it
    pub async fn points_cost(&self, operation: Operation) -> Option<u32> {
        self.points(false).await.table.cost_of(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = ClientConfig::builder("http://localhost:8000/api").build();
        let client = JobClient::new(config).unwrap();
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_config_token_seeds_session() {
        let config = ClientConfig::builder("http://localhost:8000")
            .token("seed")
            .build();
        let client = JobClient::new(config).unwrap();
        assert_eq!(client.credentials().token().as_deref(), Some("seed"));

        client.logout();
        assert!(!client.is_logged_in());
    }

    #[test]
    fn test_client_from_yaml() {
        let yaml = r#"
connection:
  base_url: "http://localhost:8000/api"

polling:
  interval_ms: 250
"#;
        let client = JobClient::from_yaml(yaml).unwrap();
        assert_eq!(client.config().polling.interval_ms, 250);
        assert!(matches!(
            JobClient::from_yaml("connection: ["),
            Err(JobError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_without_session() {
        let client = JobClient::new(ClientConfig::builder("http://127.0.0.1:9").build()).unwrap();
        let request = JobRequest::new(Operation::Scale, Asset::PreUploaded("http://x/a.png".into()));
        let err = client.submit_and_await(request).await.unwrap_err();
        assert!(err.is_session_expired());
    }

    #[test]
    fn test_request_debug_hides_callback() {
        let request = JobRequest::new(Operation::Scale, Asset::PreUploaded("u".into()))
            .on_progress(|_| {});
        assert!(format!("{:?}", request).contains("on_progress: true"));
    }
}
