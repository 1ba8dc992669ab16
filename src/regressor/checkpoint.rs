use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rand::Rng;
use rmp_serde::{decode::from_read, encode::write_named};
use serde::{Deserialize, Serialize};

use super::head::{AdamState, RegressorHead, AUX_FEATURES};
use super::TrainError;

pub const CHECKPOINT_VERSION: u32 = 1;

/// Everything needed to resume training or run predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub embedding_len: usize,
    pub epochs_completed: u64,
    pub head: RegressorHead,
    pub optimizer: AdamState,
}

/// A missing or zero-length model file means "untrained".
pub fn is_trained(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

impl Checkpoint {
    pub fn fresh<R: Rng>(embedding_len: usize, hidden_size: usize, rng: &mut R) -> Self {
        let head = RegressorHead::new(embedding_len + AUX_FEATURES, hidden_size, rng);
        let optimizer = AdamState::new(&head);
        Self {
            version: CHECKPOINT_VERSION,
            embedding_len,
            epochs_completed: 0,
            head,
            optimizer,
        }
    }

    /// Loads a checkpoint; `Ok(None)` for the untrained sentinel.
    pub fn load(path: &Path) -> Result<Option<Self>, TrainError> {
        if !is_trained(path) {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: Checkpoint = from_read(reader)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(TrainError::Incompatible(format!(
                "checkpoint version {} (expected {})",
                checkpoint.version, CHECKPOINT_VERSION
            )));
        }
        checkpoint.head.validate().map_err(TrainError::Incompatible)?;
        if checkpoint.head.input_len != checkpoint.embedding_len + AUX_FEATURES {
            return Err(TrainError::Incompatible(format!(
                "head expects {} inputs but embedding length is {}",
                checkpoint.head.input_len, checkpoint.embedding_len
            )));
        }
        Ok(Some(checkpoint))
    }

    /// Writes the checkpoint to a sibling temp file and renames it into place,
    /// so readers only ever see a complete file.
    pub fn save(&self, path: &Path) -> Result<(), TrainError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("model.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            write_named(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
