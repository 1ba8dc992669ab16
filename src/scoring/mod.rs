//! Vision scorers: race distribution, body-type distribution and the image
//! embedding used by the interest regressor.

mod error;
mod onnx;
mod utils;
pub mod body;
pub mod embedding;
pub mod face;
pub mod features;

pub use body::{BodyTypeScorer, OnnxBodyTypeScorer};
pub use embedding::{ImageEmbedding, OnnxImageEmbedder};
pub use error::ScoringError;
pub use face::{DemographicScorer, FaceBox, FaceDetector, FairFaceScorer, RaceClassifier};
pub use features::{list_images, FeatureAssembler, FeatureBatch, ScorerContext};
pub use onnx::OnnxModel;
pub use utils::softmax;

/// Number of classes in the race taxonomy.
pub const RACE_CLASSES: usize = 7;
/// Number of body-type classes.
pub const BODY_CLASSES: usize = 3;

pub const RACE_LABELS: [&str; RACE_CLASSES] = [
    "White",
    "Black",
    "Latino_Hispanic",
    "East Asian",
    "Southeast Asian",
    "Indian",
    "Middle Eastern",
];

pub const BODY_LABELS: [&str; BODY_CLASSES] = ["Obese", "Neutral", "Thin"];

pub type RaceScores = [f32; RACE_CLASSES];
pub type BodyScores = [f32; BODY_CLASSES];

/// The "no signal" race distribution.
pub fn uniform_race_scores() -> RaceScores {
    [1.0 / RACE_CLASSES as f32; RACE_CLASSES]
}
