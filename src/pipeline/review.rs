use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::PipelineError;
use crate::config::Settings;
use crate::profile::ProfilePaths;
use crate::store::{ImageRecord, PredictionLedger, StoreError, VerdictRecord, VerdictTable};

/// The ledger row currently up for review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub record: ImageRecord,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// The correction differed enough to become training data.
    Recorded(VerdictRecord),
    /// The stored score was close enough; nothing was added.
    Unchanged,
    /// The correction differed but the image was gone, so nothing was added.
    ImageMissing,
    /// Nothing left to review.
    AllReviewed,
}

/// Oldest-first review of past decisions.
///
/// Every confirmation removes the reviewed profile from the ledger and
/// deletes its images. Corrections that move the score by at least the
/// tolerance are kept as verdicts, with the image copied to the training
/// corpus as `<profile>.<ext>`.
pub struct ReviewSession {
    ledger: PredictionLedger,
    verdicts: VerdictTable,
    training_dir: PathBuf,
    tolerance: f32,
}

impl ReviewSession {
    pub fn new(settings: &Settings, paths: &ProfilePaths) -> Result<Self, PipelineError> {
        Ok(Self::from_parts(
            paths.open_ledger(settings.max_profile_stored)?,
            paths.open_verdicts(),
            paths.training_dir(),
            settings.review_tolerance,
        ))
    }

    pub fn from_parts(
        ledger: PredictionLedger,
        verdicts: VerdictTable,
        training_dir: PathBuf,
        tolerance: f32,
    ) -> Self {
        Self {
            ledger,
            verdicts,
            training_dir,
            tolerance,
        }
    }

    pub fn remaining(&self) -> Result<usize, StoreError> {
        self.ledger.len()
    }

    /// The next item, or `None` once everything has been reviewed.
    pub fn current(&self) -> Result<Option<ReviewItem>, StoreError> {
        Ok(self.ledger.oldest()?.map(|record| ReviewItem {
            image_path: self.ledger.profile_dir(&record.profile).join(&record.image),
            record,
        }))
    }

    pub fn items(&self) -> Result<Vec<ReviewItem>, StoreError> {
        Ok(self
            .ledger
            .records()?
            .into_iter()
            .map(|record| ReviewItem {
                image_path: self.ledger.profile_dir(&record.profile).join(&record.image),
                record,
            })
            .collect())
    }

    /// Confirms the current item with the user's `score` (clamped to [-1, 1]).
    pub fn confirm(&mut self, score: f32) -> Result<ReviewOutcome, PipelineError> {
        let Some(item) = self.current()? else {
            return Ok(ReviewOutcome::AllReviewed);
        };
        let score = score.clamp(-1.0, 1.0);
        let record = &item.record;

        let outcome = if (score - record.interest_score).abs() >= self.tolerance {
            match self.copy_to_training(&item.image_path, &record.profile) {
                Ok(image) => {
                    let verdict = VerdictRecord {
                        image,
                        outcome: score,
                        race_scores: record.race_scores,
                        body_scores: record.body_scores,
                    };
                    self.verdicts.append(&verdict)?;
                    info!(
                        "Recorded verdict {:.2} for {} (predicted {:.2})",
                        score, record.profile, record.interest_score
                    );
                    ReviewOutcome::Recorded(verdict)
                }
                Err(e) => {
                    warn!("Cannot keep verdict for {}: {}", record.profile, e);
                    ReviewOutcome::ImageMissing
                }
            }
        } else {
            ReviewOutcome::Unchanged
        };

        self.ledger.remove_profile(&record.profile)?;
        self.ledger.remove_profile_dir(&record.profile);
        Ok(outcome)
    }

    fn copy_to_training(&self, image_path: &Path, profile: &str) -> std::io::Result<String> {
        let name = match image_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", profile, ext),
            None => profile.to_string(),
        };
        fs::create_dir_all(&self.training_dir)?;
        fs::copy(image_path, self.training_dir.join(&name))?;
        Ok(name)
    }
}
