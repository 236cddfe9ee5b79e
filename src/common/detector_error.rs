use thiserror::Error;

/// Failure taxonomy of the detection core. None of these is fatal to the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// Malformed camera buffer. The frame is dropped and the next one proceeds.
    #[error("invalid frame format: {0}")]
    InvalidFrameFormat(String),
    /// Model or label assets missing or corrupt. The engine stays not ready.
    #[error("model load failure: {0}")]
    ModelLoadFailure(String),
    /// A single forward pass failed. Only the current frame is abandoned.
    #[error("inference failure: {0}")]
    InferenceFailure(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DetectorError {
    pub fn frame(msg: impl Into<String>) -> Self {
        DetectorError::InvalidFrameFormat(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        DetectorError::ModelLoadFailure(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        DetectorError::InferenceFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DetectorError::InvalidConfig(msg.into())
    }

    /// Frame-local errors are recovered by simply moving on to the next frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, DetectorError::InvalidFrameFormat(_) | DetectorError::InferenceFailure(_))
    }
}
