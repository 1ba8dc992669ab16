//! Personalized profile scoring with a human-in-the-loop retraining cycle.
//!
//! For every scraped profile the pipeline scores each photo with two
//! auxiliary vision models (a 7-class race distribution and a 3-class
//! body-type distribution), feeds them with an image embedding into a small
//! per-user regressor, and reduces the per-photo interest scores to a
//! like/dislike decision. Decisions are kept in a bounded ledger; reviewing
//! them produces verdicts that the trainer folds into the next fine-tuning
//! run.
//!
//! ```no_run
//! use autoswipe::pipeline::DecisionPolicy;
//!
//! let outcome = DecisionPolicy::default().decide(&[0.95, 0.95, -0.5]);
//! println!("{} (avg {:.3})", outcome.decision, outcome.average);
//! ```

pub mod asset_manager;
pub mod config;
pub mod labeling;
pub mod pipeline;
pub mod profile;
pub mod regressor;
pub mod runtime;
pub mod scoring;
pub mod store;

pub use asset_manager::{AssetError, AssetManager, ScorerAsset};
pub use config::{ConfigError, Settings};
pub use labeling::SeedLabeler;
pub use pipeline::{
    CycleStage, Decision, DecisionPolicy, PipelineError, PipelineEvent, ReviewSession,
    SwipeController, SwipeSession,
};
pub use profile::{ProfileError, ProfilePaths, ProfileStore};
pub use regressor::{InterestRegressor, TrainError, Trainer, TrainingPreset};
pub use runtime::RuntimeConfig;
pub use scoring::{FeatureAssembler, FeatureBatch, ScorerContext, ScoringError};
pub use store::{ImageRecord, PredictionLedger, StoreError, VerdictRecord, VerdictTable};

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
