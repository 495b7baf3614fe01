//! Job state decoding
//!
//! The backend reports job state as a signed integer: `1` means the job has
//! finished, a negative value means it failed (the exact value selects the
//! failure reason), and anything else means it is still being processed.

use serde::{Deserialize, Serialize};

/// State code the backend uses for a finished job
pub const STATE_COMPLETED: i64 = 1;

/// Decoded state of a job at the time of one status read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued or running (state `0` or any positive value other than `1`)
    Pending,
    /// Finished; a result reference should accompany the status
    Completed,
    /// Terminated with an error
    Failed(FailureKind),
}

impl JobState {
    /// Check if the job finished successfully
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the job failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Check if the job is still being processed
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Human-readable failure message; `None` unless the job failed
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Failed(kind) => Some(kind.message()),
            _ => None,
        }
    }
}

/// Decode a backend state code.
///
/// Defined for every `i64`; unknown negative codes decode to
/// [`FailureKind::Unknown`] rather than panicking.
pub fn decode(state: i64) -> JobState {
    if state == STATE_COMPLETED {
        JobState::Completed
    } else if state < 0 {
        JobState::Failed(FailureKind::from_code(state))
    } else {
        JobState::Pending
    }
}

/// Why a job did not produce a result
///
/// The first group is decoded from backend state codes; the rest are raised
/// by the client when a response breaks the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `-1`: generic processing failure
    Processing,
    /// `-2`: processed, but the result could not be uploaded
    ResultUpload,
    /// `-3`: the backend could not fetch the source
    SourceFetch,
    /// `-5`: source exceeds the size limit
    SourceTooLarge,
    /// `-7`: source is corrupt or in an unsupported format
    InvalidSource,
    /// `-8`: processing exceeded the server-side time budget
    ServerTimeout,
    /// Any other negative code
    Unknown(i64),

    /// Status reported success without a result reference
    MissingResultRef,
    /// Submit response carried no job handle
    NoJobHandle,
    /// Object upload returned no usable URL
    UploadNoReference,
}

impl FailureKind {
    /// Map a negative backend state code to its failure kind
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => Self::Processing,
            -2 => Self::ResultUpload,
            -3 => Self::SourceFetch,
            -5 => Self::SourceTooLarge,
            -7 => Self::InvalidSource,
            -8 => Self::ServerTimeout,
            other => Self::Unknown(other),
        }
    }

    /// Backend state code, if this kind was decoded from one
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Processing => Some(-1),
            Self::ResultUpload => Some(-2),
            Self::SourceFetch => Some(-3),
            Self::SourceTooLarge => Some(-5),
            Self::InvalidSource => Some(-7),
            Self::ServerTimeout => Some(-8),
            Self::Unknown(code) => Some(*code),
            Self::MissingResultRef | Self::NoJobHandle | Self::UploadNoReference => None,
        }
    }

    /// Whether the failure is a client-detected protocol violation
    pub fn is_protocol_violation(&self) -> bool {
        self.code().is_none()
    }

    /// Fixed human-readable message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Processing => "processing failed",
            Self::ResultUpload => "processing finished but the result upload failed",
            Self::SourceFetch => "backend could not fetch the source; check that the URL is reachable",
            Self::SourceTooLarge => "source exceeds the size limit (15MB)",
            Self::InvalidSource => "invalid source file (corrupt or unsupported format)",
            Self::ServerTimeout => "processing exceeded the server time budget (30s)",
            Self::Unknown(_) => "unknown error",
            Self::MissingResultRef => "missing result reference",
            Self::NoJobHandle => "no job handle in response",
            Self::UploadNoReference => "upload produced no reference",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{} (state {})", self.message(), code),
            None => f.write_str(self.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1, FailureKind::Processing)]
    #[case(-2, FailureKind::ResultUpload)]
    #[case(-3, FailureKind::SourceFetch)]
    #[case(-5, FailureKind::SourceTooLarge)]
    #[case(-7, FailureKind::InvalidSource)]
    #[case(-8, FailureKind::ServerTimeout)]
    #[case(-4, FailureKind::Unknown(-4))]
    #[case(-6, FailureKind::Unknown(-6))]
    #[case(i64::MIN, FailureKind::Unknown(i64::MIN))]
    fn test_negative_codes(#[case] code: i64, #[case] expected: FailureKind) {
        let state = decode(code);
        assert!(state.is_failed());
        assert!(!state.is_completed());
        assert_eq!(state, JobState::Failed(expected));
        assert_eq!(state.message(), Some(expected.message()));
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(3)]
    #[case(99)]
    #[case(i64::MAX)]
    fn test_pending_codes(#[case] code: i64) {
        let state = decode(code);
        assert!(state.is_pending());
        assert!(!state.is_completed());
        assert!(!state.is_failed());
        assert_eq!(state.message(), None);
    }

    #[test]
    fn test_completed() {
        let state = decode(1);
        assert!(state.is_completed());
        assert!(!state.is_failed());
        assert_eq!(state.message(), None);
    }

    #[test]
    fn test_unknown_message() {
        assert_eq!(decode(-42).message(), Some("unknown error"));
    }

    #[test]
    fn test_decode_is_deterministic() {
        for code in -20..20 {
            assert_eq!(decode(code), decode(code));
        }
    }

    #[test]
    fn test_code_roundtrip() {
        for code in [-1, -2, -3, -5, -7, -8, -100] {
            assert_eq!(FailureKind::from_code(code).code(), Some(code));
        }
        assert!(FailureKind::MissingResultRef.is_protocol_violation());
        assert!(!FailureKind::Processing.is_protocol_violation());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FailureKind::SourceTooLarge.to_string(),
            "source exceeds the size limit (15MB) (state -5)"
        );
        assert_eq!(
            FailureKind::NoJobHandle.to_string(),
            "no job handle in response"
        );
    }
}
