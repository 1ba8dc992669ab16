use ort::Error as OrtError;

/// Errors raised while scoring a single image.
///
/// The pipeline recovers from all of these per image; see
/// [`FeatureAssembler`](super::FeatureAssembler).
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// The image could not be opened or decoded
    #[error("Image error: {0}")]
    ImageError(String),
    /// Loading or running an ONNX model failed
    #[error("Model error: {0}")]
    ModelError(String),
    #[error("Face detector error: {0}")]
    DetectorError(String),
    /// A model produced output of an unexpected shape
    #[error("Output shape error: {0}")]
    ShapeError(String),
}

impl From<OrtError> for ScoringError {
    fn from(err: OrtError) -> Self {
        ScoringError::ModelError(err.to_string())
    }
}

impl From<image::ImageError> for ScoringError {
    fn from(err: image::ImageError) -> Self {
        ScoringError::ImageError(err.to_string())
    }
}
