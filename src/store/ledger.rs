use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::records::ImageRecord;
use super::table::{CsvTable, TableStore};
use super::{StoreError, LEDGER_HEADER};

/// Bounded, append-only record of past profile decisions awaiting review.
///
/// Each row references a profile whose images live in
/// `prediction_dir/<profile>/`. Eviction removes the oldest rows and those
/// profiles' image folders, which is what bounds on-disk growth.
pub struct PredictionLedger<T = CsvTable<ImageRecord>> {
    table: T,
    prediction_dir: PathBuf,
    cap: usize,
}

impl PredictionLedger<CsvTable<ImageRecord>> {
    /// Opens (creating if necessary) the CSV ledger at `path`.
    pub fn open(
        path: impl Into<PathBuf>,
        prediction_dir: impl Into<PathBuf>,
        cap: usize,
    ) -> Result<Self, StoreError> {
        let table = CsvTable::new(path, &LEDGER_HEADER);
        table.ensure_exists()?;
        Ok(Self::with_table(table, prediction_dir, cap))
    }
}

impl<T: TableStore<ImageRecord>> PredictionLedger<T> {
    pub fn with_table(table: T, prediction_dir: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            table,
            prediction_dir: prediction_dir.into(),
            cap: cap.max(1),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn prediction_dir(&self) -> &Path {
        &self.prediction_dir
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.prediction_dir.join(profile)
    }

    pub fn records(&self) -> Result<Vec<ImageRecord>, StoreError> {
        self.table.load()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.table.len()
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Oldest record, the next one due for review.
    pub fn oldest(&self) -> Result<Option<ImageRecord>, StoreError> {
        Ok(self.table.load()?.into_iter().next())
    }

    /// Writes one row, then enforces the retention cap.
    ///
    /// Returns the profiles evicted by this write.
    pub fn append(&self, record: &ImageRecord) -> Result<Vec<String>, StoreError> {
        self.table.append(record)?;
        self.enforce_retention(self.cap)
    }

    /// Keeps only the newest `cap` rows and deletes the image folder of every
    /// evicted profile.
    pub fn enforce_retention(&self, cap: usize) -> Result<Vec<String>, StoreError> {
        let rows = self.table.load()?;
        if rows.len() <= cap {
            return Ok(Vec::new());
        }
        let overflow = rows.len() - cap;
        let kept = &rows[overflow..];
        self.table.rewrite(kept)?;

        let still_referenced: HashSet<&str> = kept.iter().map(|r| r.profile.as_str()).collect();
        let mut evicted = Vec::with_capacity(overflow);
        for row in &rows[..overflow] {
            if still_referenced.contains(row.profile.as_str()) {
                continue;
            }
            self.remove_profile_dir(&row.profile);
            evicted.push(row.profile.clone());
        }
        info!("Evicted {} profile(s); keeping the {} most recent", evicted.len(), cap);
        Ok(evicted)
    }

    /// Removes every row belonging to `profile`. Returns the number of rows removed.
    pub fn remove_profile(&self, profile: &str) -> Result<usize, StoreError> {
        let rows = self.table.load()?;
        let before = rows.len();
        let kept: Vec<ImageRecord> = rows.into_iter().filter(|r| r.profile != profile).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.table.rewrite(&kept)?;
        }
        Ok(removed)
    }

    /// Deletes the image folder of `profile`, logging rather than failing.
    pub fn remove_profile_dir(&self, profile: &str) {
        let folder = self.profile_dir(profile);
        if !folder.exists() {
            warn!("Folder {:?} does not exist", folder);
            return;
        }
        match fs::remove_dir_all(&folder) {
            Ok(()) => info!("Removed {:?}", folder),
            Err(e) => warn!("Error removing folder {:?}: {}", folder, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Decision;
    use crate::scoring::uniform_race_scores;
    use tempfile::TempDir;

    fn record(profile: &str, score: f32) -> ImageRecord {
        ImageRecord {
            profile: profile.to_string(),
            image: "image_0.png".to_string(),
            race_scores: uniform_race_scores(),
            body_scores: [0.2, 0.3, 0.5],
            interest_score: score,
            decision: if score > 0.2 { Decision::Like } else { Decision::Dislike },
        }
    }

    fn ledger(dir: &TempDir, cap: usize) -> PredictionLedger {
        let path = dir.path().join("predictions.csv");
        PredictionLedger::open(path, dir.path().join("PREDICTION"), cap).unwrap()
    }

    #[test]
    fn test_append_round_trips_row() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, 10);
        ledger.append(&record("p0", 0.75)).unwrap();

        let rows = ledger.records().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], record("p0", 0.75));

        let text = fs::read_to_string(dir.path().join("predictions.csv")).unwrap();
        assert!(text.starts_with(
            "profile,image,race_score,obesity_score,predicted_attractiveness,final_decision"
        ));
    }

    #[test]
    fn test_eviction_keeps_newest_and_removes_folders() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, 3);
        for i in 0..5 {
            let profile = format!("p{}", i);
            fs::create_dir_all(ledger.profile_dir(&profile)).unwrap();
            fs::write(ledger.profile_dir(&profile).join("image_0.png"), b"x").unwrap();
            ledger.append(&record(&profile, 0.1 * i as f32)).unwrap();
            assert!(ledger.len().unwrap() <= 3);
        }

        let profiles: Vec<String> =
            ledger.records().unwrap().into_iter().map(|r| r.profile).collect();
        assert_eq!(profiles, vec!["p2", "p3", "p4"]);
        assert!(!ledger.profile_dir("p0").exists());
        assert!(!ledger.profile_dir("p1").exists());
        assert!(ledger.profile_dir("p4").exists());
    }

    #[test]
    fn test_remove_profile_rows() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir, 10);
        ledger.append(&record("a", 0.5)).unwrap();
        ledger.append(&record("b", 0.5)).unwrap();
        assert_eq!(ledger.remove_profile("a").unwrap(), 1);
        assert_eq!(ledger.remove_profile("missing").unwrap(), 0);
        assert_eq!(ledger.oldest().unwrap().unwrap().profile, "b");
    }
}
