use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::Settings;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset not present: {0}")]
    Missing(String),
    #[error("No download source configured for {0}")]
    NoSource(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    BadStatus { url: String, status: u16 },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Checksum at {url} is not a SHA-256 digest")]
    BadChecksum { url: String },
    #[error("Hash mismatch for {file}: expected {expected}, got {actual}")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// The model files the scoring pipeline needs besides the per-user interest model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScorerAsset {
    /// SeetaFace frontal cascade used by `rustface`
    FaceDetector,
    /// FairFace ResNet-34 exported to ONNX
    RaceClassifier,
    /// Gray-scale 3-class body-type classifier exported to ONNX
    BodyTypeClassifier,
    /// Frozen image backbone producing the regressor's embedding
    ImageBackbone,
}

impl ScorerAsset {
    pub const ALL: [ScorerAsset; 4] = [
        ScorerAsset::FaceDetector,
        ScorerAsset::RaceClassifier,
        ScorerAsset::BodyTypeClassifier,
        ScorerAsset::ImageBackbone,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::FaceDetector => "seeta_fd_frontal_v1.0.bin",
            Self::RaceClassifier => "fairface_race_7.onnx",
            Self::BodyTypeClassifier => "body_type_3.onnx",
            Self::ImageBackbone => "image_backbone.onnx",
        }
    }
}

/// Resolves, downloads and verifies scorer model files.
///
/// After a download the SHA-256 of the file is recorded in a `.sha256`
/// sidecar; every later load is checked against it. A file placed by hand
/// without a sidecar is trusted once and its hash recorded.
#[derive(Clone)]
pub struct AssetManager {
    assets_dir: PathBuf,
    base_url: Option<String>,
    download_lock: Arc<Mutex<()>>,
}

impl AssetManager {
    pub fn new<P: AsRef<Path>>(assets_dir: P, base_url: Option<String>) -> io::Result<Self> {
        let assets_dir = assets_dir.as_ref().to_path_buf();
        fs::create_dir_all(&assets_dir)?;
        Ok(Self {
            assets_dir,
            base_url,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn from_settings(settings: &Settings) -> io::Result<Self> {
        Self::new(settings.asset_dir(), settings.asset_base_url.clone())
    }

    pub fn get_asset_path(&self, asset: ScorerAsset) -> PathBuf {
        self.assets_dir.join(asset.file_name())
    }

    fn sidecar_path(&self, asset: ScorerAsset) -> PathBuf {
        self.assets_dir.join(format!("{}.sha256", asset.file_name()))
    }

    pub fn is_asset_present(&self, asset: ScorerAsset) -> bool {
        let path = self.get_asset_path(asset);
        log::debug!("Checking asset {:?} at {:?} (exists: {})", asset, path, path.exists());
        path.exists()
    }

    fn hash_file(path: &Path) -> Result<String, AssetError> {
        let bytes = fs::read(path)?;
        Ok(hash_bytes(&bytes))
    }

    /// Checks the asset against its recorded hash.
    ///
    /// Returns `Ok(false)` when the file is missing or its hash differs.
    pub fn verify_asset(&self, asset: ScorerAsset) -> Result<bool, AssetError> {
        let path = self.get_asset_path(asset);
        if !path.exists() {
            log::info!("Asset {:?} does not exist", path);
            return Ok(false);
        }
        let actual = Self::hash_file(&path)?;
        let sidecar = self.sidecar_path(asset);
        if !sidecar.exists() {
            log::info!("Recording hash for {:?}: {}", path, actual);
            fs::write(&sidecar, &actual)?;
            return Ok(true);
        }
        let expected = fs::read_to_string(&sidecar)?.trim().to_string();
        log::debug!("Calculated hash: {}", actual);
        log::debug!("Expected hash:   {}", expected);
        Ok(actual == expected)
    }

    /// Returns the asset path if the file is present and passes verification.
    pub fn verified_path(&self, asset: ScorerAsset) -> Result<PathBuf, AssetError> {
        let path = self.get_asset_path(asset);
        if !path.exists() {
            return Err(AssetError::Missing(asset.file_name().to_string()));
        }
        let actual = Self::hash_file(&path)?;
        let sidecar = self.sidecar_path(asset);
        if sidecar.exists() {
            let expected = fs::read_to_string(&sidecar)?.trim().to_string();
            if expected != actual {
                log::error!(
                    "{} hash mismatch: expected {}, got {}",
                    asset.file_name(),
                    expected,
                    actual
                );
                return Err(AssetError::HashMismatch {
                    file: asset.file_name().to_string(),
                    expected,
                    actual,
                });
            }
        } else {
            fs::write(&sidecar, &actual)?;
        }
        Ok(path)
    }

    /// Downloads `asset` from the configured source.
    ///
    /// The source must publish `<file>.sha256` next to every file. The
    /// downloaded bytes are checked against it before anything is written,
    /// so a truncated or tampered download never replaces a local file.
    pub async fn download_asset(&self, asset: ScorerAsset) -> Result<(), AssetError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| AssetError::NoSource(asset.file_name().to_string()))?;
        let url = format!("{}/{}", base.trim_end_matches('/'), asset.file_name());
        let _lock = self.download_lock.lock().await;

        let checksum_url = format!("{}.sha256", url);
        let checksum = String::from_utf8_lossy(&fetch(&checksum_url).await?).into_owned();
        let expected = parse_checksum(&checksum).ok_or_else(|| AssetError::BadChecksum {
            url: checksum_url.clone(),
        })?;

        log::info!("Downloading {} from {}", asset.file_name(), url);
        let bytes = fetch(&url).await?;
        log::info!("Downloaded {} bytes", bytes.len());
        self.install(asset, &bytes, &expected)?;
        log::info!("{} downloaded and verified successfully", asset.file_name());
        Ok(())
    }

    /// Writes `bytes` as `asset` if they hash to `expected`.
    fn install(&self, asset: ScorerAsset, bytes: &[u8], expected: &str) -> Result<(), AssetError> {
        let actual = hash_bytes(bytes);
        if actual != expected {
            log::error!(
                "{} hash mismatch: expected {}, got {}",
                asset.file_name(),
                expected,
                actual
            );
            return Err(AssetError::HashMismatch {
                file: asset.file_name().to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        let path = self.get_asset_path(asset);
        fs::create_dir_all(&self.assets_dir)?;
        let tmp = path.with_extension("part");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        fs::write(self.sidecar_path(asset), expected)?;
        Ok(())
    }

    pub fn remove_asset(&self, asset: ScorerAsset) -> Result<(), AssetError> {
        let path = self.get_asset_path(asset);
        let sidecar = self.sidecar_path(asset);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
        Ok(())
    }

    /// Ensures that an asset is present and verified.
    /// If it is missing it will be downloaded; if verification fails it is re-downloaded.
    pub async fn ensure_asset(&self, asset: ScorerAsset) -> Result<(), AssetError> {
        if !self.is_asset_present(asset) {
            log::info!("Asset {:?} not found, downloading...", asset);
            return self.download_asset(asset).await;
        }
        if !self.verify_asset(asset)? {
            log::warn!("Asset {:?} failed verification, re-downloading...", asset);
            self.remove_asset(asset)?;
            self.download_asset(asset).await?;
        }
        Ok(())
    }

    pub async fn ensure_all(&self) -> Result<(), AssetError> {
        for asset in ScorerAsset::ALL {
            self.ensure_asset(asset).await?;
        }
        Ok(())
    }
}

async fn fetch(url: &str) -> Result<Vec<u8>, AssetError> {
    let response = reqwest::get(url).await?;
    log::debug!("GET {} -> {}", url, response.status());
    if !response.status().is_success() {
        return Err(AssetError::BadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// Accepts `sha256sum` output: the first token must be 64 hex digits.
fn parse_checksum(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?;
    if token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
