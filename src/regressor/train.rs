use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::checkpoint::Checkpoint;
use super::dataset::Dataset;
use super::head::{AdamState, Gradients, HIDDEN_SIZE};
use super::TrainError;
use crate::config::Settings;

/// Epoch-count tiers offered for fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingPreset {
    Accurate,
    #[default]
    Moderate,
    Basic,
    Custom(usize),
}

impl TrainingPreset {
    pub fn epochs(&self) -> usize {
        match self {
            TrainingPreset::Accurate => 500,
            TrainingPreset::Moderate => 200,
            TrainingPreset::Basic => 100,
            TrainingPreset::Custom(n) => *n,
        }
    }
}

impl FromStr for TrainingPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accurate" => Ok(TrainingPreset::Accurate),
            "moderate" => Ok(TrainingPreset::Moderate),
            "basic" => Ok(TrainingPreset::Basic),
            other => other
                .parse::<usize>()
                .map(TrainingPreset::Custom)
                .map_err(|_| {
                    format!(
                        "unknown preset {:?} (accurate, moderate, basic or an epoch count)",
                        s
                    )
                }),
        }
    }
}

impl fmt::Display for TrainingPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingPreset::Accurate => write!(f, "accurate"),
            TrainingPreset::Moderate => write!(f, "moderate"),
            TrainingPreset::Basic => write!(f, "basic"),
            TrainingPreset::Custom(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub hidden_size: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: TrainingPreset::default().epochs(),
            batch_size: 8,
            learning_rate: 1e-3,
            hidden_size: HIDDEN_SIZE,
            seed: 42,
        }
    }
}

impl TrainOptions {
    pub fn from_settings(settings: &Settings, preset: TrainingPreset) -> Result<Self, TrainError> {
        let epochs = preset.epochs();
        if epochs == 0 {
            return Err(TrainError::InvalidEpochs);
        }
        Ok(Self {
            epochs,
            batch_size: settings.batch_size,
            learning_rate: settings.learning_rate,
            seed: settings.seed.unwrap_or(42),
            ..Self::default()
        })
    }
}

/// Reported once per completed epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainProgress {
    /// 1-based index within this run.
    pub epoch: usize,
    pub total_epochs: usize,
    pub train_mse: f32,
    /// Absent when every example went to the training split.
    pub test_mse: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub epochs_run: usize,
    /// Epochs accumulated in the checkpoint across all runs.
    pub epochs_total: u64,
    pub cancelled: bool,
    pub last: Option<TrainProgress>,
}

/// Fine-tunes the head stored at a model path.
///
/// Each run continues from the existing checkpoint. The checkpoint is written
/// after every completed epoch; a cancelled epoch's updates are discarded, so
/// the file on disk always holds whole epochs.
pub struct Trainer {
    options: TrainOptions,
    cancel: CancellationToken,
    progress: Option<UnboundedSender<TrainProgress>>,
}

impl Trainer {
    pub fn new(options: TrainOptions, cancel: CancellationToken) -> Self {
        Self {
            options,
            cancel,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: UnboundedSender<TrainProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &TrainOptions {
        &self.options
    }

    pub fn train(&self, model_path: &Path, dataset: &Dataset) -> Result<TrainSummary, TrainError> {
        if self.options.epochs == 0 {
            return Err(TrainError::InvalidEpochs);
        }
        if dataset.train.is_empty() {
            return Err(TrainError::EmptyDataset);
        }

        let mut checkpoint = match Checkpoint::load(model_path)? {
            Some(existing) => {
                if existing.embedding_len != dataset.embedding_len {
                    return Err(TrainError::Incompatible(format!(
                        "model was trained on {}-dim embeddings, dataset has {}",
                        existing.embedding_len, dataset.embedding_len
                    )));
                }
                info!(
                    "Resuming from {:?} after {} epoch(s)",
                    model_path, existing.epochs_completed
                );
                existing
            }
            None => {
                info!("Starting a new model at {:?}", model_path);
                let mut rng = StdRng::seed_from_u64(self.options.seed);
                Checkpoint::fresh(dataset.embedding_len, self.options.hidden_size, &mut rng)
            }
        };
        if !checkpoint.optimizer.matches(&checkpoint.head) {
            warn!("Optimizer state does not match the head; resetting it");
            checkpoint.optimizer = AdamState::new(&checkpoint.head);
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed ^ checkpoint.epochs_completed);
        let mut indices: Vec<usize> = (0..dataset.train.len()).collect();
        let batch_size = self.options.batch_size.max(1);
        let total = self.options.epochs;
        let mut summary = TrainSummary {
            epochs_run: 0,
            epochs_total: checkpoint.epochs_completed,
            cancelled: false,
            last: None,
        };

        'epochs: for epoch in 1..=total {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let mut head = checkpoint.head.clone();
            let mut optimizer = checkpoint.optimizer.clone();
            indices.shuffle(&mut rng);
            for batch in indices.chunks(batch_size) {
                if self.cancel.is_cancelled() {
                    info!("Training cancelled during epoch {}; keeping the previous epoch", epoch);
                    summary.cancelled = true;
                    break 'epochs;
                }
                let mut grads = Gradients::zeros_like(&head);
                for &i in batch {
                    let example = &dataset.train[i];
                    head.accumulate(&example.input, example.target, &mut grads);
                }
                grads.scale(1.0 / batch.len() as f32);
                optimizer.apply(&mut head, &grads, self.options.learning_rate);
            }

            checkpoint.head = head;
            checkpoint.optimizer = optimizer;
            checkpoint.epochs_completed += 1;
            checkpoint.save(model_path)?;

            let progress = TrainProgress {
                epoch,
                total_epochs: total,
                train_mse: checkpoint
                    .head
                    .mse(dataset.train.iter().map(|e| (e.input.as_slice(), e.target)))
                    .unwrap_or(0.0),
                test_mse: checkpoint
                    .head
                    .mse(dataset.test.iter().map(|e| (e.input.as_slice(), e.target))),
            };
            match progress.test_mse {
                Some(test) => info!(
                    "Epoch {}/{}: train mse {:.4}, test mse {:.4}",
                    epoch, total, progress.train_mse, test
                ),
                None => info!("Epoch {}/{}: train mse {:.4}", epoch, total, progress.train_mse),
            }
            if let Some(tx) = &self.progress {
                let _ = tx.send(progress.clone());
            }
            summary.epochs_run = epoch;
            summary.epochs_total = checkpoint.epochs_completed;
            summary.last = Some(progress);
        }

        Ok(summary)
    }
}
