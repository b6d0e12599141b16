use thiserror::Error;

use crate::handle::HandleKind;
use crate::solution::SolutionState;
use crate::status::Status;

/// Errors returned by the MediaPipe bridge.
#[derive(Debug, Error)]
pub enum MediapipeError {
    #[error("mediapipe: null {0} handle")]
    InvalidHandle(HandleKind),

    #[error("mediapipe: {0} handle used after release")]
    UseAfterRelease(HandleKind),

    #[error("mediapipe: runtime init failed: {0}")]
    Init(Status),

    #[error("mediapipe: graph init failed at {stage}: {status}")]
    GraphInit { stage: &'static str, status: Status },

    #[error("mediapipe: graph is {0}, not running")]
    NotRunning(SolutionState),

    #[error("mediapipe: solution is closed")]
    Closed,

    #[error("mediapipe: add packet at {timestamp_us}us failed: {status}")]
    Inject { timestamp_us: i64, status: Status },

    #[error("mediapipe: {op} failed: {status}")]
    Status { op: &'static str, status: Status },

    #[error("mediapipe: invalid frame: {0}")]
    InvalidFrame(String),

    #[error("mediapipe: decode landmarks: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("mediapipe: asset {0:?}: {1}")]
    Resource(String, String),
}

impl MediapipeError {
    /// The foreign status behind this error, if there is one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Init(status)
            | Self::GraphInit { status, .. }
            | Self::Inject { status, .. }
            | Self::Status { status, .. } => Some(status),
            _ => None,
        }
    }
}
