use std::path::Path;

use image::DynamicImage;
use ndarray::Array1;

use super::error::ScoringError;
use super::onnx::OnnxModel;
use super::utils::{rgb_to_tensor, IMAGENET_MEAN, IMAGENET_STD};
use crate::runtime::RuntimeConfig;

/// Provides image embedding functionality for the interest regressor.
///
/// The embedding comes from a frozen backbone, so the same image always maps
/// to the same vector and embeddings can be computed once per dataset build.
///
/// The ONNX backbone is expected to:
/// - accept one input of shape `[1, 3, size, size]`, ImageNet-normalized RGB
/// - return a pooled feature vector (any trailing singleton dims are flattened)
pub trait ImageEmbedding: Send + Sync {
    /// Length of the vectors returned by [`embed_image`](ImageEmbedding::embed_image).
    fn embedding_size(&self) -> usize;

    fn embed_image(&self, image: &DynamicImage) -> Result<Array1<f32>, ScoringError>;

    /// Decodes and embeds the image at `path`.
    ///
    /// # Errors
    /// - `ImageError` if the file cannot be opened or decoded
    /// - Forwards all errors from `embed_image()`
    fn embed_path(&self, path: &Path) -> Result<Array1<f32>, ScoringError> {
        let image = image::open(path)
            .map_err(|e| ScoringError::ImageError(format!("{:?}: {}", path, e)))?;
        self.embed_image(&image)
    }
}

pub struct OnnxImageEmbedder {
    model: OnnxModel,
    input_size: u32,
    embedding_size: usize,
}

impl OnnxImageEmbedder {
    /// Loads the backbone and infers its embedding size by running a blank image.
    pub fn load(
        path: &Path,
        input_size: u32,
        config: &RuntimeConfig,
    ) -> Result<Self, ScoringError> {
        let model = OnnxModel::load(path, config)?;
        let blank = DynamicImage::new_rgb8(input_size, input_size).to_rgb8();
        let input = rgb_to_tensor(&blank, input_size, IMAGENET_MEAN, IMAGENET_STD);
        let embedding_size = model.run(input)?.len();
        if embedding_size == 0 {
            return Err(ScoringError::ShapeError("Backbone returned an empty embedding".into()));
        }
        log::info!("Inferred embedding size from backbone: {}", embedding_size);
        Ok(Self {
            model,
            input_size,
            embedding_size,
        })
    }
}

impl ImageEmbedding for OnnxImageEmbedder {
    fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Array1<f32>, ScoringError> {
        let input = rgb_to_tensor(&image.to_rgb8(), self.input_size, IMAGENET_MEAN, IMAGENET_STD);
        let output = self.model.run(input)?;
        if output.len() != self.embedding_size {
            return Err(ScoringError::ShapeError(format!(
                "Backbone returned {} values, expected {}",
                output.len(),
                self.embedding_size
            )));
        }
        Ok(Array1::from(output))
    }
}
