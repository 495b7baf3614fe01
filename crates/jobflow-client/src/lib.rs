//! jobflow-client - Submit-then-poll client for remote processing jobs
//!
//! A job is submitted to a processing backend that answers immediately with a
//! job handle and finishes the work out-of-band. This crate drives one job from
//! a local or pre-uploaded asset to its terminal [`Outcome`]:
//!
//! 1. Upload the asset to the object store, unless it already has a URL
//! 2. Submit the processing request and locate the job handle in the reply
//! 3. Poll the job's status at a fixed cadence until it resolves or the attempt
//!    budget runs out
//!
//! # Example
//!
//! ```rust,no_run
//! use jobflow_client::{Asset, ClientConfig, JobClient, JobRequest, Operation};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::builder("http://localhost:8000/api").build();
//!     let client = JobClient::new(config)?;
//!     client.login("alice", "secret").await?;
//!
//!     let request = JobRequest::new(Operation::Scale, Asset::Local("photo.jpg".into()))
//!         .on_progress(|p| println!("{:>3.0}%", p * 100.0));
//!
//!     match client.submit_and_await(request).await? {
//!         outcome if outcome.is_success() => println!("{:?}", outcome.result_ref()),
//!         outcome => eprintln!("{:?}", outcome.message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The capabilities the poller and orchestrator depend on are traits
//! ([`StatusSource`], [`JobBackend`], [`ObjectStore`]). The `testing` module
//! provides an in-process backend for integration tests:
//!
//! ```rust,ignore
//! use jobflow_client::testing::{completed, FakeJobServer};
//!
//! let fake = FakeJobServer::new();
//! fake.script_statuses([completed("http://cdn/out.png")]);
//! let server = fake.start().await?;
//! let client = JobClient::new(server.config_builder().token(FakeJobServer::TOKEN).build())?;
//! ```

pub mod backend;
mod client;
pub mod config;
pub mod credentials;
mod error;
mod http;
pub mod operation;
pub mod orchestrator;
pub mod points;
pub mod poller;
pub mod testing;

pub use backend::{
    JobBackend, ObjectStore, OperationStatus, PointsFetcher, StatusSource, SubmitRequest,
    SubmitSource, UploadReceipt,
};
pub use client::{JobClient, JobRequest, ProgressCallback};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use credentials::{CredentialsProvider, FileCredentials, MemoryCredentials};
pub use error::{JobError, Result};
pub use http::HttpBackend;
pub use operation::{Operation, UnknownOperation};
pub use orchestrator::{Asset, Orchestrator, SubmitOptions};
pub use points::{PointsCatalog, PointsLookup, PointsSource, PointsTable};
pub use poller::{PollPolicy, Poller, ProgressSink};

// Re-export core types for convenience
pub use jobflow_core::{FailureKind, JobHandle, JobState, JobStatus, Outcome};
pub use tokio_util::sync::CancellationToken;
