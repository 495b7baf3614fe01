//! jobflow-core - Core types for asynchronously processed remote jobs
//!
//! A job is submitted to a processing backend, which answers immediately with a
//! job handle and completes the work out-of-band. This crate holds the pure,
//! I/O-free pieces of the client side of that protocol:
//!
//! - [`status`]: decoding the backend's signed state code into a [`JobState`]
//! - [`progress`]: clamping untrusted progress values into the unit interval
//! - [`models`]: job handles, status payloads and terminal [`Outcome`]s
//! - [`extract`]: pulling fields out of loosely shaped backend responses
//! - [`cache`]: a timestamped value with an explicit staleness check

pub mod cache;
pub mod error;
pub mod extract;
pub mod models;
pub mod progress;
pub mod status;

pub use cache::Cached;
pub use error::{CoreError, CoreResult};
pub use extract::{extract_job_handle, extract_token, extract_upload_url, HandleShape};
pub use models::{JobHandle, JobStatus, Outcome, StatusEnvelope};
pub use progress::{normalize, ProgressRange};
pub use status::{decode, FailureKind, JobState};
