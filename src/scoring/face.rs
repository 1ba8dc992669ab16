//! Face detection and race-distribution scoring.
//!
//! One image goes through these steps:
//! 1. A working copy whose longest side is bounded is made, which caps
//!    detector cost.
//! 2. Faces are detected on the gray-scale working copy.
//! 3. Each face box is mapped back to the original image, padded, cropped
//!    square and resized to a fixed chip.
//! 4. Each chip goes through the race classifier, which returns a 7-way
//!    soft-max.
//! 5. The per-face distributions are averaged with equal weight.
//!
//! If no face is found, the result is the uniform distribution. That means
//! "no signal", not an error.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use log::{debug, warn};
use ndarray::Array1;
use rustface::{Detector, ImageData};

use super::error::ScoringError;
use super::onnx::OnnxModel;
use super::utils::{
    average_vectors, bounded_working_copy, rgb_to_tensor, softmax, IMAGENET_MEAN, IMAGENET_STD,
};
use super::{uniform_race_scores, RaceScores, RACE_CLASSES};
use crate::runtime::RuntimeConfig;

/// Longest side of the detector's working copy.
pub const DETECTOR_MAX_SIDE: u32 = 800;
/// Side of the aligned face chip fed to the race classifier.
pub const FACE_CHIP_SIZE: u32 = 224;
/// Fraction of the face box added on every side before cropping.
pub const FACE_PADDING: f32 = 0.25;

/// Axis-aligned face box in pixel coordinates of the image passed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Scales the box by `factor` around the origin.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: (self.x as f32 * factor).round() as i32,
            y: (self.y as f32 * factor).round() as i32,
            width: ((self.width as f32 * factor).round() as u32).max(1),
            height: ((self.height as f32 * factor).round() as u32).max(1),
        }
    }
}

/// Finds faces on a gray-scale image.
pub trait FaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Vec<FaceBox>;
}

/// SeetaFace cascade detector provided by `rustface`.
pub struct RustfaceDetector {
    inner: Box<dyn Detector>,
}

impl RustfaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, ScoringError> {
        let path = model_path.to_str().ok_or_else(|| {
            ScoringError::DetectorError(format!("Non UTF-8 path: {:?}", model_path))
        })?;
        let mut inner = rustface::create_detector(path).map_err(|e| {
            ScoringError::DetectorError(format!("Failed to load {:?}: {}", model_path, e))
        })?;
        inner.set_min_face_size(20);
        inner.set_score_thresh(2.0);
        inner.set_pyramid_scale_factor(0.8);
        inner.set_slide_window_step(4, 4);
        Ok(Self { inner })
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Vec<FaceBox> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let image = ImageData::new(gray.as_raw(), width, height);
        self.inner
            .detect(&image)
            .into_iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                }
            })
            .collect()
    }
}

/// Produces raw race logits for one aligned face chip.
pub trait RaceClassifier {
    fn race_logits(&self, chip: &RgbImage) -> Result<Vec<f32>, ScoringError>;
}

/// FairFace-style classifier. The model's output row starts with the 7 race
/// logits, followed by heads this pipeline ignores.
pub struct OnnxRaceClassifier {
    model: OnnxModel,
}

impl OnnxRaceClassifier {
    pub fn load(path: &Path, config: &RuntimeConfig) -> Result<Self, ScoringError> {
        Ok(Self { model: OnnxModel::load(path, config)? })
    }
}

impl RaceClassifier for OnnxRaceClassifier {
    fn race_logits(&self, chip: &RgbImage) -> Result<Vec<f32>, ScoringError> {
        let input = rgb_to_tensor(chip, FACE_CHIP_SIZE, IMAGENET_MEAN, IMAGENET_STD);
        let output = self.model.run(input)?;
        if output.len() < RACE_CLASSES {
            return Err(ScoringError::ShapeError(format!(
                "Race classifier returned {} values, expected at least {}",
                output.len(),
                RACE_CLASSES
            )));
        }
        Ok(output[..RACE_CLASSES].to_vec())
    }
}

/// Scores one image with a race-distribution.
pub trait DemographicScorer {
    /// Returns the averaged distribution, or the uniform distribution when no face is found.
    fn race_scores(&mut self, image: &DynamicImage) -> Result<RaceScores, ScoringError>;
}

pub struct FairFaceScorer {
    detector: Box<dyn FaceDetector>,
    classifier: Box<dyn RaceClassifier>,
    max_side: u32,
}

impl FairFaceScorer {
    pub fn new(detector: Box<dyn FaceDetector>, classifier: Box<dyn RaceClassifier>) -> Self {
        Self {
            detector,
            classifier,
            max_side: DETECTOR_MAX_SIDE,
        }
    }

    pub fn with_max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side.max(1);
        self
    }

    /// Detects faces and returns one padded square chip per face.
    pub fn face_chips(&mut self, image: &DynamicImage) -> Vec<RgbImage> {
        let (working, back_to_original) = bounded_working_copy(image, self.max_side);
        let faces = self.detector.detect(&working.to_luma8());
        if faces.is_empty() {
            debug!("No faces found");
            return Vec::new();
        }

        let rgb = image.to_rgb8();
        faces
            .iter()
            .filter_map(|face| {
                crop_chip(&rgb, &face.scaled(back_to_original), FACE_PADDING, FACE_CHIP_SIZE)
            })
            .collect()
    }
}

impl DemographicScorer for FairFaceScorer {
    fn race_scores(&mut self, image: &DynamicImage) -> Result<RaceScores, ScoringError> {
        let chips = self.face_chips(image);
        let mut distributions = Vec::with_capacity(chips.len());
        for chip in &chips {
            let logits = self.classifier.race_logits(chip)?;
            distributions.push(Array1::from(softmax(&logits)));
        }
        Ok(average_race_distributions(&distributions))
    }
}

/// Averages per-face distributions; no faces means uniform.
pub(crate) fn average_race_distributions(distributions: &[Array1<f32>]) -> RaceScores {
    if distributions.is_empty() {
        return uniform_race_scores();
    }
    let mean = average_vectors(distributions, RACE_CLASSES);
    let mut scores = [0.0f32; RACE_CLASSES];
    for (slot, value) in scores.iter_mut().zip(mean.iter()) {
        *slot = *value;
    }
    scores
}

/// Crops a square around the padded face box, clamped to the image, and
/// resizes it to `size`. Returns `None` when the box lies outside the image.
pub(crate) fn crop_chip(
    image: &RgbImage,
    face: &FaceBox,
    padding: f32,
    size: u32,
) -> Option<RgbImage> {
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    let side = (face.width.max(face.height) as f32 * (1.0 + 2.0 * padding)).round() as i64;
    let center_x = face.x as i64 + face.width as i64 / 2;
    let center_y = face.y as i64 + face.height as i64 / 2;

    let left = (center_x - side / 2).clamp(0, img_w);
    let top = (center_y - side / 2).clamp(0, img_h);
    let right = (center_x + side / 2).clamp(0, img_w);
    let bottom = (center_y + side / 2).clamp(0, img_h);
    if right <= left || bottom <= top {
        warn!("Face box {:?} lies outside the image", face);
        return None;
    }

    let cropped = image::imageops::crop_imm(
        image,
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    )
    .to_image();
    Some(image::imageops::resize(&cropped, size, size, FilterType::Triangle))
}
