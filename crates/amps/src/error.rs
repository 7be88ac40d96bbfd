use amp_common::frame::FrameError;
use thiserror::Error;

/// Errors that can occur during relay server operation.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Frame read or write failure.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    /// Discovery reply body failed to encode.
    #[error("json encoding: {0}")]
    Json(#[from] serde_json::Error),
}
