use std::path::Path;

use image::DynamicImage;
use log::error;

use super::error::ScoringError;
use super::onnx::OnnxModel;
use super::utils::{luma_to_tensor, softmax};
use super::{BodyScores, BODY_CLASSES};
use crate::runtime::RuntimeConfig;

/// Input side of the body-type classifier.
pub const BODY_INPUT_SIZE: u32 = 224;

/// Scores one image with an `[obese, neutral, thin]` distribution.
///
/// Implementors provide [`try_body_scores`](BodyTypeScorer::try_body_scores);
/// [`body_scores`](BodyTypeScorer::body_scores) turns any failure into the
/// all-zero "unknown" vector, which is distinct from a real low-confidence
/// distribution because it does not sum to 1.
pub trait BodyTypeScorer {
    fn try_body_scores(&self, image: &DynamicImage) -> Result<BodyScores, ScoringError>;

    fn body_scores(&self, image: &DynamicImage) -> BodyScores {
        match self.try_body_scores(image) {
            Ok(scores) => scores,
            Err(e) => {
                error!("Body-type scoring failed: {}", e);
                [0.0; BODY_CLASSES]
            }
        }
    }
}

/// Single-channel EfficientNet-style classifier with a 3-way head.
pub struct OnnxBodyTypeScorer {
    model: OnnxModel,
}

impl OnnxBodyTypeScorer {
    pub fn load(path: &Path, config: &RuntimeConfig) -> Result<Self, ScoringError> {
        Ok(Self { model: OnnxModel::load(path, config)? })
    }
}

impl BodyTypeScorer for OnnxBodyTypeScorer {
    fn try_body_scores(&self, image: &DynamicImage) -> Result<BodyScores, ScoringError> {
        // Gray-scale, normalized to [-1, 1]
        let input = luma_to_tensor(&image.to_luma8(), BODY_INPUT_SIZE, 0.5, 0.5);
        let logits = self.model.run(input)?;
        body_distribution(&logits)
    }
}

pub(crate) fn body_distribution(logits: &[f32]) -> Result<BodyScores, ScoringError> {
    if logits.len() != BODY_CLASSES {
        return Err(ScoringError::ShapeError(format!(
            "Body-type classifier returned {} logits, expected {}",
            logits.len(),
            BODY_CLASSES
        )));
    }
    let probs = softmax(logits);
    Ok([probs[0], probs[1], probs[2]])
}
