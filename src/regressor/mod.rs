//! Personalized interest regressor and its trainer.
//!
//! A frozen image backbone produces an embedding; a small trainable head maps
//! `embedding ‖ race ‖ body` to an interest score in [-1, 1]. Only the head is
//! stored in the per-profile model file.

use std::io;
use std::path::Path;
use std::sync::Arc;

use log::warn;

use crate::scoring::{FeatureBatch, ImageEmbedding, ScoringError};
use crate::store::StoreError;

pub mod checkpoint;
pub mod dataset;
pub mod head;
pub mod train;

pub use checkpoint::{is_trained, Checkpoint};
pub use dataset::{collect_labels, Dataset, Example, LabeledImage};
pub use head::{input_vector, AdamState, Gradients, RegressorHead, AUX_FEATURES, HIDDEN_SIZE};
pub use train::{TrainOptions, TrainProgress, TrainSummary, Trainer, TrainingPreset};

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("Model {0:?} has not been trained yet")]
    Untrained(std::path::PathBuf),
    #[error("No labeled images to train on")]
    EmptyDataset,
    #[error("Epoch count must be positive")]
    InvalidEpochs,
    #[error("Incompatible checkpoint: {0}")]
    Incompatible(String),
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Checkpoint encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Checkpoint decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Embedding error: {0}")]
    Embedding(#[from] ScoringError),
    #[error("Dataset error: {0}")]
    Store(#[from] StoreError),
}

/// Read-only prediction path: backbone plus trained head.
pub struct InterestRegressor {
    embedder: Arc<dyn ImageEmbedding>,
    head: RegressorHead,
}

impl InterestRegressor {
    pub fn new(embedder: Arc<dyn ImageEmbedding>, head: RegressorHead) -> Result<Self, TrainError> {
        let expected = embedder.embedding_size() + AUX_FEATURES;
        if head.input_len != expected {
            return Err(TrainError::Incompatible(format!(
                "head expects {} inputs, backbone provides {}",
                head.input_len, expected
            )));
        }
        Ok(Self { embedder, head })
    }

    /// Loads the head from `path`. An untrained model file is an error here.
    pub fn load(path: &Path, embedder: Arc<dyn ImageEmbedding>) -> Result<Self, TrainError> {
        let checkpoint =
            Checkpoint::load(path)?.ok_or_else(|| TrainError::Untrained(path.to_path_buf()))?;
        Self::new(embedder, checkpoint.head)
    }

    pub fn head(&self) -> &RegressorHead {
        &self.head
    }

    /// One score per image of `batch`, in batch order.
    ///
    /// An image the backbone cannot embed is scored from its auxiliary
    /// features alone (zero embedding).
    pub fn predict(&self, batch: &FeatureBatch) -> Vec<f32> {
        let size = self.embedder.embedding_size();
        batch
            .image_paths
            .iter()
            .zip(batch.race_scores.iter().zip(&batch.body_scores))
            .map(|(path, (race, body))| {
                let embedding = match self.embedder.embed_path(path) {
                    Ok(embedding) => embedding.to_vec(),
                    Err(e) => {
                        warn!("Embedding failed for {:?}: {}", path, e);
                        vec![0.0; size]
                    }
                };
                self.head.forward(&input_vector(&embedding, race, body))
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MeanColorEmbedder;
    use super::*;
    use crate::scoring::uniform_race_scores;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_predict_one_score_per_image() {
        let dir = TempDir::new().unwrap();
        let mut batch = FeatureBatch::default();
        for (i, value) in [0u8, 255].iter().enumerate() {
            let path = dir.path().join(format!("{}.png", i));
            image::RgbImage::from_pixel(4, 4, image::Rgb([*value; 3])).save(&path).unwrap();
            batch.push(path, uniform_race_scores(), [0.0, 1.0, 0.0]);
        }
        batch.push(dir.path().join("missing.png"), uniform_race_scores(), [0.0; 3]);

        let mut rng = StdRng::seed_from_u64(5);
        let head = RegressorHead::new(3 + AUX_FEATURES, 8, &mut rng);
        let regressor = InterestRegressor::new(Arc::new(MeanColorEmbedder), head).unwrap();
        let scores = regressor.predict(&batch);
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(regressor.predict(&batch), scores);
    }

    #[test]
    fn test_untrained_model_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.model");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            InterestRegressor::load(&path, Arc::new(MeanColorEmbedder)),
            Err(TrainError::Untrained(_))
        ));
    }

    #[test]
    fn test_mismatched_head_is_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        let head = RegressorHead::new(99, 4, &mut rng);
        assert!(InterestRegressor::new(Arc::new(MeanColorEmbedder), head).is_err());
    }
}
