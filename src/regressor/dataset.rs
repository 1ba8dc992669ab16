use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use super::head::input_vector;
use super::TrainError;
use crate::config::Settings;
use crate::profile::ProfilePaths;
use crate::scoring::{BodyScores, ImageEmbedding, RaceScores};
use crate::store::VerdictRecord;

/// One image with a human-provided outcome, resolved to a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub outcome: f32,
    pub race_scores: RaceScores,
    pub body_scores: BodyScores,
}

/// Merges seed labels and review verdicts into one list.
///
/// Seed images resolve against `seed_dir`, verdict images against
/// `training_dir`. A verdict replaces the seed label of the same image name,
/// and a later verdict replaces an earlier one.
pub fn collect_labels(
    seed_labels: &[VerdictRecord],
    seed_dir: &Path,
    verdicts: &[VerdictRecord],
    training_dir: &Path,
) -> Vec<LabeledImage> {
    let mut labels: Vec<LabeledImage> = Vec::with_capacity(seed_labels.len() + verdicts.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    let sources = seed_labels
        .iter()
        .map(|r| (r, seed_dir))
        .chain(verdicts.iter().map(|r| (r, training_dir)));
    for (record, dir) in sources {
        let labeled = LabeledImage {
            path: dir.join(&record.image),
            outcome: record.outcome.clamp(-1.0, 1.0),
            race_scores: record.race_scores,
            body_scores: record.body_scores,
        };
        match index.get(&record.image) {
            Some(&i) => labels[i] = labeled,
            None => {
                index.insert(record.image.clone(), labels.len());
                labels.push(labeled);
            }
        }
    }
    labels
}

#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub input: Vec<f32>,
    pub target: f32,
}

/// Embedded training examples split into train and held-out parts.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub embedding_len: usize,
    pub train: Vec<Example>,
    pub test: Vec<Example>,
}

impl Dataset {
    /// Embeds every labeled image once and splits the result.
    ///
    /// `tts` is the fraction kept for training; at least one example always
    /// lands in the training part. Images that cannot be embedded are skipped.
    pub fn build<R: Rng>(
        labels: &[LabeledImage],
        embedder: &dyn ImageEmbedding,
        tts: f32,
        rng: &mut R,
    ) -> Result<Self, TrainError> {
        let mut examples = Vec::with_capacity(labels.len());
        for label in labels {
            match embedder.embed_path(&label.path) {
                Ok(embedding) => examples.push(Example {
                    input: input_vector(
                        &embedding.to_vec(),
                        &label.race_scores,
                        &label.body_scores,
                    ),
                    target: label.outcome,
                }),
                Err(e) => warn!("Skipping {:?}: {}", label.path, e),
            }
        }
        if examples.is_empty() {
            return Err(TrainError::EmptyDataset);
        }

        examples.shuffle(rng);
        let n = examples.len();
        let train_len = ((n as f32) * tts.clamp(0.0, 1.0)).round() as usize;
        let train_len = train_len.clamp(1, n);
        let test = examples.split_off(train_len);
        info!("Dataset ready: {} train / {} test examples", examples.len(), test.len());

        Ok(Self {
            embedding_len: embedder.embedding_size(),
            train: examples,
            test,
        })
    }

    /// Seed labels and review verdicts of one profile, embedded and split by `TTS`.
    pub fn for_profile<R: Rng>(
        settings: &Settings,
        paths: &ProfilePaths,
        embedder: &dyn ImageEmbedding,
        rng: &mut R,
    ) -> Result<Self, TrainError> {
        let seed_labels = paths.open_seed_labels().records()?;
        let verdicts = paths.open_verdicts().records()?;
        info!(
            "Building dataset for {}: {} seed labels, {} verdicts",
            paths.name,
            seed_labels.len(),
            verdicts.len()
        );
        let labels = collect_labels(
            &seed_labels,
            &settings.init_data_dir(),
            &verdicts,
            &paths.training_dir(),
        );
        Self::build(&labels, embedder, settings.tts, rng)
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
