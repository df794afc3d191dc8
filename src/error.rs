//! Service error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("No face detected in the image")]
    NoFaceDetected,

    #[error(
        "face box ({x1}, {y1}, {x2}, {y2}) does not overlap the {width}x{height} image"
    )]
    InvalidFaceRegion {
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        width: u32,
        height: u32,
    },

    #[error("inference failed: {0:#}")]
    Inference(#[from] anyhow::Error),

    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FaceError {
    /// Stable code reported to API clients
    pub fn code(&self) -> &'static str {
        match self {
            FaceError::Decode(_) => "DECODE_FAILED",
            FaceError::NoFaceDetected => "NO_FACE_DETECTED",
            FaceError::InvalidFaceRegion { .. } => "INVALID_FACE_REGION",
            FaceError::Inference(_) | FaceError::Task(_) => "INFERENCE_FAILED",
        }
    }
}

pub type FaceResult<T> = std::result::Result<T, FaceError>;
