//! Job handles, status payloads and terminal outcomes

use serde::{Deserialize, Deserializer, Serialize};

use crate::status::{decode, FailureKind, JobState};

/// Message carried by [`Outcome::TimedOut`]
pub const TIMED_OUT_MESSAGE: &str = "processing timed out";

/// Message carried by [`Outcome::Cancelled`]
pub const CANCELLED_MESSAGE: &str = "cancelled";

// =============================================================================
// Job Handle
// =============================================================================

/// Opaque job identifier issued by the backend at submission time
///
/// The backend sends it either as a string or as a number; both are kept in
/// their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for JobHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Ok(Self(s)),
            Raw::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

// =============================================================================
// Job Status
// =============================================================================

/// Status response body: `{ "data": { "state": .., "progress": .., "file"|"image": .. } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub data: StatusData,
}

/// Inner status payload as sent by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusData {
    /// Signed state code
    pub state: i64,

    /// Backend progress on a 0–100 scale; numeric strings are accepted,
    /// anything else reads as absent
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: Option<f64>,

    /// Result reference (document jobs and newer image jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Result reference (older image jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

impl StatusData {
    /// Result reference, checking `file` before `image`; empty strings count as absent
    pub fn result_ref(&self) -> Option<&str> {
        [self.file.as_deref(), self.image.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

/// One status read, scoped to a single poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: i64,
    pub progress: Option<f64>,
    pub result_ref: Option<String>,
}

impl JobStatus {
    pub fn new(state: i64) -> Self {
        Self {
            state,
            progress: None,
            result_ref: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_result_ref(mut self, result_ref: impl Into<String>) -> Self {
        self.result_ref = Some(result_ref.into());
        self
    }

    /// Decode the state code
    pub fn decoded(&self) -> JobState {
        decode(self.state)
    }
}

impl From<StatusData> for JobStatus {
    fn from(data: StatusData) -> Self {
        let result_ref = data.result_ref().map(String::from);
        Self {
            state: data.state,
            progress: data.progress,
            result_ref,
        }
    }
}

impl From<StatusEnvelope> for JobStatus {
    fn from(envelope: StatusEnvelope) -> Self {
        envelope.data.into()
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Terminal value of a job, produced exactly once per poll session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The job finished and produced a result
    Succeeded { job: JobHandle, result_ref: String },

    /// The backend reported a failure, or a response broke the protocol
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<JobHandle>,
        kind: FailureKind,
        message: String,
    },

    /// The attempt budget ran out while the job was still pending
    TimedOut { job: JobHandle, attempts: u32 },

    /// The caller abandoned the session
    Cancelled {
        #[serde(skip_serializing_if = "Option::is_none")]
        job: Option<JobHandle>,
    },
}

impl Outcome {
    /// Build a failure carrying the kind's fixed message
    pub fn failed(job: Option<JobHandle>, kind: FailureKind) -> Self {
        Self::Failed {
            job,
            kind,
            message: kind.message().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Result reference of a successful job
    pub fn result_ref(&self) -> Option<&str> {
        match self {
            Self::Succeeded { result_ref, .. } => Some(result_ref),
            _ => None,
        }
    }

    /// Failure kind, if the outcome is [`Outcome::Failed`]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Job the outcome belongs to, when one was issued
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            Self::Succeeded { job, .. } | Self::TimedOut { job, .. } => Some(job),
            Self::Failed { job, .. } | Self::Cancelled { job } => job.as_ref(),
        }
    }

    /// Human-readable summary; `None` for success
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Succeeded { .. } => None,
            Self::Failed { message, .. } => Some(message),
            Self::TimedOut { .. } => Some(TIMED_OUT_MESSAGE),
            Self::Cancelled { .. } => Some(CANCELLED_MESSAGE),
        }
    }
}
