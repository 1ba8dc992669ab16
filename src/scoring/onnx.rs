use std::collections::HashMap;
use std::path::Path;

use log::{error, info};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use super::error::ScoringError;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// A single-input ONNX vision model.
///
/// The model is expected to:
/// - accept one `float32` tensor of shape `[batch, channels, height, width]`
/// - return its scores (logits or embedding) as the first output
#[derive(Debug)]
pub struct OnnxModel {
    session: Session,
    input_name: String,
    model_path: String,
}

impl OnnxModel {
    /// Loads the model at `path` using the shared runtime configuration.
    ///
    /// # Errors
    /// - `ModelError` if the file does not exist or fails to load
    /// - `ModelError` if the model has no inputs or no outputs
    pub fn load(path: &Path, config: &RuntimeConfig) -> Result<Self, ScoringError> {
        if !path.exists() {
            return Err(ScoringError::ModelError(format!("Model file not found: {:?}", path)));
        }
        let session = create_session_builder(config)?
            .commit_from_file(path)
            .map_err(|e| {
                error!("Failed to load ONNX model {:?}: {}", path, e);
                ScoringError::ModelError(format!("Failed to load {:?}: {}", path, e))
            })?;

        Self::validate_model(&session)?;
        let input_name = session.inputs[0].name.clone();
        info!("Loaded ONNX model {:?} (input '{}')", path, input_name);

        Ok(Self {
            session,
            input_name,
            model_path: path.to_string_lossy().to_string(),
        })
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    /// Runs the model on one NCHW tensor and returns the first output flattened.
    pub fn run(&self, input: Array4<f32>) -> Result<Vec<f32>, ScoringError> {
        let input_dyn = input.into_dyn();
        let input_view = input_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(&input_view).map_err(|e| {
                ScoringError::ModelError(format!("Failed to create input tensor: {}", e))
            })?,
        );

        let outputs = self
            .session
            .run(input_tensors)
            .map_err(|e| ScoringError::ModelError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            ScoringError::ModelError(format!("Failed to extract output tensor: {}", e))
        })?;

        Ok(output_tensor.iter().copied().collect())
    }

    fn validate_model(session: &Session) -> Result<(), ScoringError> {
        if session.inputs.is_empty() {
            return Err(ScoringError::ModelError("Model must have an image input".to_string()));
        }
        if session.outputs.is_empty() {
            return Err(ScoringError::ModelError("Model must have at least 1 output".to_string()));
        }
        Ok(())
    }
}
