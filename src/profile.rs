//! User profiles: one personal model plus its ledger, verdicts and corpora.
//!
//! ```text
//! BASE_DIR/weights/<name>/
//!     <name>.model        interest model (empty = untrained)
//!     <name>.csv          seed labels
//!     predictions.csv     prediction ledger
//!     user_verdicts.csv   review verdicts
//!     PREDICTION/<id>/    scraped profile images
//!     TRAINING/           images behind the verdicts
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::Settings;
use crate::regressor::is_trained;
use crate::store::{PredictionLedger, StoreError, VerdictTable};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Invalid profile name {0:?}")]
    InvalidName(String),
    #[error("Profile {0:?} already exists")]
    AlreadyExists(String),
    #[error("Profile {0:?} does not exist")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolved file locations of one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    pub name: String,
    pub root: PathBuf,
}

impl ProfilePaths {
    pub fn new(weights_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: weights_dir.join(name),
        }
    }

    /// Profile named by the stem of `MODELPATH`, the active model.
    pub fn from_model_path(model_path: &Path) -> Option<Self> {
        let name = model_path.file_stem()?.to_str()?;
        let root = model_path.parent()?;
        Some(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }

    pub fn model(&self) -> PathBuf {
        self.root.join(format!("{}.model", self.name))
    }

    pub fn seed_labels(&self) -> PathBuf {
        self.root.join(format!("{}.csv", self.name))
    }

    pub fn ledger(&self) -> PathBuf {
        self.root.join("predictions.csv")
    }

    pub fn verdicts(&self) -> PathBuf {
        self.root.join("user_verdicts.csv")
    }

    pub fn prediction_dir(&self) -> PathBuf {
        self.root.join("PREDICTION")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.root.join("TRAINING")
    }

    pub fn open_ledger(&self, cap: usize) -> Result<PredictionLedger, StoreError> {
        PredictionLedger::open(self.ledger(), self.prediction_dir(), cap)
    }

    pub fn open_verdicts(&self) -> VerdictTable {
        VerdictTable::open(self.verdicts())
    }

    pub fn open_seed_labels(&self) -> VerdictTable {
        VerdictTable::open(self.seed_labels())
    }
}

/// Creates, lists and deletes profiles under `BASE_DIR/weights`.
pub struct ProfileStore {
    weights_dir: PathBuf,
}

impl ProfileStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            weights_dir: base_dir.join("weights"),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.base_dir)
    }

    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    fn validate_name(name: &str) -> Result<(), ProfileError> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(ProfileError::InvalidName(name.to_string()))
        }
    }

    pub fn paths(&self, name: &str) -> Result<ProfilePaths, ProfileError> {
        Self::validate_name(name)?;
        Ok(ProfilePaths::new(&self.weights_dir, name))
    }

    /// Paths of an existing profile.
    pub fn open(&self, name: &str) -> Result<ProfilePaths, ProfileError> {
        let paths = self.paths(name)?;
        if !paths.root.is_dir() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        Ok(paths)
    }

    /// Creates the profile folder and an empty (untrained) model file.
    pub fn create(&self, name: &str) -> Result<ProfilePaths, ProfileError> {
        let paths = self.paths(name)?;
        if paths.root.exists() {
            return Err(ProfileError::AlreadyExists(name.to_string()));
        }
        fs::create_dir_all(&paths.root)?;
        fs::File::create(paths.model())?;
        info!("Created profile {} at {:?}", name, paths.root);
        Ok(paths)
    }

    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        if !self.weights_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(&self.weights_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Removes the profile with its model, ledger, verdicts and images.
    pub fn delete(&self, name: &str) -> Result<(), ProfileError> {
        let paths = self.open(name)?;
        fs::remove_dir_all(&paths.root)?;
        info!("Deleted profile {}", name);
        Ok(())
    }

    pub fn is_trained(&self, name: &str) -> Result<bool, ProfileError> {
        Ok(is_trained(&self.open(name)?.model()))
    }

    pub fn feedback_count(&self, name: &str) -> Result<usize, ProfileError> {
        Ok(self.open(name)?.open_verdicts().len()?)
    }
}
