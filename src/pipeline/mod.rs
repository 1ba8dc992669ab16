//! The online half of the system: one swipe cycle per profile, the decision
//! rule, the scraper seam and the review loop that feeds verdicts back into
//! training.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::asset_manager::AssetError;
use crate::config::ConfigError;
use crate::regressor::TrainError;
use crate::scoring::ScoringError;
use crate::store::StoreError;

pub mod decision;
pub mod review;
pub mod session;
pub mod swipe;

pub use decision::{DecisionPolicy, PolicyOutcome};
pub use review::{ReviewItem, ReviewOutcome, ReviewSession};
pub use session::{DirectorySession, ProfileDownload, SwipeSession};
pub use swipe::{SwipeController, SwipeDelays, SwipeReport};

/// Binary outcome for a whole profile. Stored as `1` (like) / `0` (dislike).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Decision {
    Dislike,
    Like,
}

impl From<Decision> for u8 {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Dislike => 0,
            Decision::Like => 1,
        }
    }
}

impl TryFrom<u8> for Decision {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Decision::Dislike),
            1 => Ok(Decision::Like),
            other => Err(format!("decision must be 0 or 1, got {}", other)),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Like => write!(f, "Like"),
            Decision::Dislike => write!(f, "Dislike"),
        }
    }
}

/// Steps of one swipe cycle; every cycle returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    Downloading,
    Scoring,
    Deciding,
    Logging,
    Swiping,
}

/// Everything a front end needs to follow a running swipe session.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Status(String),
    Stage(CycleStage),
    ShowContinue,
    ShowStop,
    ProfileDecided {
        profile: String,
        average: f32,
        high_count: usize,
        decision: Decision,
    },
    Finished {
        completed: u32,
        skipped: u32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No trained model found. Please train a model first.")]
    ModelNotTrained,
    #[error("The swipe session is no longer available")]
    SessionLost,
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
