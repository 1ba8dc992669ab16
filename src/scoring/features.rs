use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::body::{BodyTypeScorer, OnnxBodyTypeScorer};
use super::error::ScoringError;
use super::face::{DemographicScorer, FairFaceScorer, OnnxRaceClassifier, RustfaceDetector};
use super::{uniform_race_scores, BodyScores, RaceScores, BODY_CLASSES};
use crate::asset_manager::{AssetManager, ScorerAsset};
use crate::runtime::RuntimeConfig;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Lists the image files of a profile directory in sorted file-name order.
pub fn list_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parallel arrays describing one profile, in sorted file-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    pub image_paths: Vec<PathBuf>,
    pub race_scores: Vec<RaceScores>,
    pub body_scores: Vec<BodyScores>,
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    pub fn push(&mut self, path: PathBuf, race: RaceScores, body: BodyScores) {
        self.image_paths.push(path);
        self.race_scores.push(race);
        self.body_scores.push(body);
    }
}

/// The auxiliary scorers, constructed once and handed to the assembler.
pub struct ScorerContext {
    pub demographic: Box<dyn DemographicScorer>,
    pub body: Box<dyn BodyTypeScorer>,
}

impl ScorerContext {
    pub fn new(demographic: Box<dyn DemographicScorer>, body: Box<dyn BodyTypeScorer>) -> Self {
        Self { demographic, body }
    }

    /// Loads the face detector, race classifier and body-type classifier from
    /// verified assets.
    pub fn load(assets: &AssetManager, config: &RuntimeConfig) -> Result<Self, ScoringError> {
        let model_path = |asset: ScorerAsset| {
            assets
                .verified_path(asset)
                .map_err(|e| ScoringError::ModelError(e.to_string()))
        };
        let detector_path = assets
            .verified_path(ScorerAsset::FaceDetector)
            .map_err(|e| ScoringError::DetectorError(e.to_string()))?;
        let detector = RustfaceDetector::load(&detector_path)?;
        let race = OnnxRaceClassifier::load(&model_path(ScorerAsset::RaceClassifier)?, config)?;
        let body = OnnxBodyTypeScorer::load(&model_path(ScorerAsset::BodyTypeClassifier)?, config)?;
        info!("Scorer context ready");
        Ok(Self::new(
            Box::new(FairFaceScorer::new(Box::new(detector), Box::new(race))),
            Box::new(body),
        ))
    }
}

/// Runs both auxiliary scorers over every image of a profile.
pub struct FeatureAssembler<'a> {
    context: &'a mut ScorerContext,
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(context: &'a mut ScorerContext) -> Self {
        Self { context }
    }

    /// Scores every image in `profile_dir`.
    ///
    /// A per-image failure never aborts the profile: an unreadable image gets
    /// a uniform race vector and a zero body vector, and a race-scoring
    /// failure alone falls back to the uniform race vector.
    pub fn assemble(&mut self, profile_dir: &Path) -> io::Result<FeatureBatch> {
        let mut batch = FeatureBatch::default();
        for path in list_images(profile_dir)? {
            let image = match image::open(&path) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Skipping scores for {:?}: {}", path, e);
                    batch.push(path, uniform_race_scores(), [0.0; BODY_CLASSES]);
                    continue;
                }
            };
            let race = self.context.demographic.race_scores(&image).unwrap_or_else(|e| {
                warn!("Race scoring failed for {:?}: {}", path, e);
                uniform_race_scores()
            });
            let body = self.context.body.body_scores(&image);
            batch.push(path, race, body);
        }
        Ok(batch)
    }
}
