//! Flat key/value settings consumed by the pipeline.
//!
//! Settings are read from a JSON object whose keys are the upper-case names
//! used throughout the data directory layout (`IMG_SIZE`, `THRESH`, ...).
//! Every key is optional; missing keys fall back to the defaults below.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Settings parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    /// Root directory holding `weights/` and the seed dataset.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Directory holding the scorer model files.
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
    /// Remote location scorer files are fetched from.
    #[serde(default)]
    pub asset_base_url: Option<String>,
    /// Inference resolution of the image backbone.
    #[serde(default = "default_img_size")]
    pub img_size: u32,
    /// Interest model checkpoint. Relative paths resolve against `base_dir`.
    #[serde(default, rename = "MODELPATH")]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_total_swipes", rename = "TOTALSWIPES")]
    pub total_swipes: u32,
    #[serde(default = "default_thresh")]
    pub thresh: f32,
    #[serde(default = "default_high_score")]
    pub high_score: f32,
    #[serde(default = "default_min_high_count")]
    pub min_high_count: usize,
    #[serde(default = "default_max_profile_stored")]
    pub max_profile_stored: usize,
    #[serde(default = "default_review_tolerance")]
    pub review_tolerance: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fraction of the combined dataset used for training; the rest is held out.
    #[serde(default = "default_tts")]
    pub tts: f32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_init_data_path")]
    pub init_data_path: PathBuf,
    #[serde(default = "default_max_consecutive_skips")]
    pub max_consecutive_skips: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Intra-op threads per ONNX session; 0 leaves the choice to ONNX Runtime.
    #[serde(default)]
    pub onnx_threads: usize,
}

fn default_base_dir() -> PathBuf {
    Settings::default_base_dir()
}
fn default_img_size() -> u32 {
    224
}
fn default_total_swipes() -> u32 {
    100
}
fn default_thresh() -> f32 {
    0.2
}
fn default_high_score() -> f32 {
    0.9
}
fn default_min_high_count() -> usize {
    2
}
fn default_max_profile_stored() -> usize {
    100
}
fn default_review_tolerance() -> f32 {
    0.1
}
fn default_batch_size() -> usize {
    8
}
fn default_tts() -> f32 {
    0.8
}
fn default_learning_rate() -> f32 {
    1e-3
}
fn default_init_data_path() -> PathBuf {
    PathBuf::from("init_data")
}
fn default_max_consecutive_skips() -> u32 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            asset_dir: None,
            asset_base_url: None,
            img_size: default_img_size(),
            model_path: None,
            total_swipes: default_total_swipes(),
            thresh: default_thresh(),
            high_score: default_high_score(),
            min_high_count: default_min_high_count(),
            max_profile_stored: default_max_profile_stored(),
            review_tolerance: default_review_tolerance(),
            batch_size: default_batch_size(),
            tts: default_tts(),
            learning_rate: default_learning_rate(),
            init_data_path: default_init_data_path(),
            max_consecutive_skips: default_max_consecutive_skips(),
            seed: None,
            onnx_threads: 0,
        }
    }
}

impl Settings {
    /// Returns the default data root.
    pub fn default_base_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("AUTOSWIPE_HOME") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("autoswipe");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".autoswipe");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("autoswipe")
    }

    /// Loads settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = if path.exists() {
            let text = fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        } else {
            log::info!("No settings file at {:?}, using defaults", path);
            Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.img_size == 0 {
            return Err(ConfigError::Invalid {
                key: "IMG_SIZE",
                reason: "must be positive".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_SIZE",
                reason: "must be positive".into(),
            });
        }
        if self.max_profile_stored == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_PROFILE_STORED",
                reason: "must be positive".into(),
            });
        }
        if !(self.tts > 0.0 && self.tts <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "TTS",
                reason: format!("{} is outside (0, 1]", self.tts),
            });
        }
        if !(-1.0..=1.0).contains(&self.thresh) {
            return Err(ConfigError::Invalid {
                key: "THRESH",
                reason: format!("{} is outside [-1, 1]", self.thresh),
            });
        }
        if self.review_tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                key: "REVIEW_TOLERANCE",
                reason: "must not be negative".into(),
            });
        }
        Ok(())
    }

    /// Directory holding the scorer model files.
    pub fn asset_dir(&self) -> PathBuf {
        self.asset_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("models"))
    }

    /// Directory holding the seed dataset images and `init_data.csv`.
    pub fn init_data_dir(&self) -> PathBuf {
        self.resolve(&self.init_data_path)
    }

    /// Resolves a possibly relative path against `base_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
