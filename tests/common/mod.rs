#![allow(dead_code)]

use std::fs;
use std::path::Path;

use autoswipe::scoring::{
    uniform_race_scores, BodyScores, BodyTypeScorer, DemographicScorer, ImageEmbedding,
    RaceScores, ScorerContext, ScoringError,
};
use autoswipe::Settings;
use env_logger::{Builder, Env};
use image::DynamicImage;
use ndarray::Array1;

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// One-dimensional embedding: mean brightness in [0, 1].
pub struct BrightnessEmbedder;

impl ImageEmbedding for BrightnessEmbedder {
    fn embedding_size(&self) -> usize {
        1
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Array1<f32>, ScoringError> {
        let gray = image.to_luma8();
        let total: f32 = gray.pixels().map(|p| p[0] as f32 / 255.0).sum();
        let n = (gray.width() * gray.height()).max(1) as f32;
        Ok(Array1::from(vec![total / n]))
    }
}

pub struct UniformRace;

impl DemographicScorer for UniformRace {
    fn race_scores(&mut self, _image: &DynamicImage) -> Result<RaceScores, ScoringError> {
        Ok(uniform_race_scores())
    }
}

pub struct NeutralBody;

impl BodyTypeScorer for NeutralBody {
    fn try_body_scores(&self, _image: &DynamicImage) -> Result<BodyScores, ScoringError> {
        Ok([0.0, 1.0, 0.0])
    }
}

pub fn scorer_context() -> ScorerContext {
    ScorerContext::new(Box::new(UniformRace), Box::new(NeutralBody))
}

pub fn write_image(path: &Path, value: u8) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::from_pixel(8, 8, image::Rgb([value; 3])).save(path).unwrap();
}

pub fn settings(base_dir: &Path) -> Settings {
    Settings {
        base_dir: base_dir.to_path_buf(),
        seed: Some(7),
        tts: 1.0,
        ..Settings::default()
    }
}
