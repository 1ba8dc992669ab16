//! Manual labeling of the seed dataset.
//!
//! The seed pool is `INIT_DATA_PATH/init_data.csv` (`image,race_scores,obese_scores`)
//! plus the images next to it. Labels are kept per profile in `<name>.csv`,
//! one row per image, in the same layout as the verdict table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::Settings;
use crate::profile::ProfilePaths;
use crate::store::{
    CsvTable, SeedRecord, StoreError, TableStore, VerdictRecord, VerdictTable, SEED_HEADER,
};

pub const SEED_INDEX_FILE: &str = "init_data.csv";

pub fn load_seed_index(seed_dir: &Path) -> Result<Vec<SeedRecord>, StoreError> {
    CsvTable::<SeedRecord>::new(seed_dir.join(SEED_INDEX_FILE), &SEED_HEADER).load()
}

/// Walks the seed images in index order, resuming at the first unlabeled one.
pub struct SeedLabeler {
    seeds: Vec<SeedRecord>,
    labels: VerdictTable,
    outcomes: HashMap<String, f32>,
    seed_dir: PathBuf,
    position: usize,
}

impl SeedLabeler {
    pub fn open(settings: &Settings, paths: &ProfilePaths) -> Result<Self, StoreError> {
        let seed_dir = settings.init_data_dir();
        let seeds = load_seed_index(&seed_dir)?;
        Self::new(seeds, paths.open_seed_labels(), seed_dir)
    }

    pub fn new(
        seeds: Vec<SeedRecord>,
        labels: VerdictTable,
        seed_dir: PathBuf,
    ) -> Result<Self, StoreError> {
        let outcomes: HashMap<String, f32> = labels
            .records()?
            .into_iter()
            .map(|r| (r.image, r.outcome))
            .collect();
        let position = seeds
            .iter()
            .position(|s| !outcomes.contains_key(&s.image))
            .unwrap_or(seeds.len());
        info!("Seed labeling: {}/{} images labeled", outcomes.len().min(seeds.len()), seeds.len());
        Ok(Self {
            seeds,
            labels,
            outcomes,
            seed_dir,
            position,
        })
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The image being labeled, or `None` past the last image.
    pub fn current(&self) -> Option<&SeedRecord> {
        self.seeds.get(self.position)
    }

    pub fn current_image_path(&self) -> Option<PathBuf> {
        self.current().map(|s| self.seed_dir.join(&s.image))
    }

    /// Stored outcome of the current image, or 0.0.
    pub fn current_outcome(&self) -> f32 {
        self.current()
            .and_then(|s| self.outcomes.get(&s.image).copied())
            .unwrap_or(0.0)
    }

    pub fn labeled_count(&self) -> usize {
        self.seeds.iter().filter(|s| self.outcomes.contains_key(&s.image)).count()
    }

    pub fn is_complete(&self) -> bool {
        self.seeds.iter().all(|s| self.outcomes.contains_key(&s.image))
    }

    /// Stores `outcome` for the current image and moves to the next one.
    /// Returns `false` when there was no current image.
    pub fn label(&mut self, outcome: f32) -> Result<bool, StoreError> {
        let Some(seed) = self.current() else {
            return Ok(false);
        };
        let outcome = outcome.clamp(-1.0, 1.0);
        let record = VerdictRecord {
            image: seed.image.clone(),
            outcome,
            race_scores: seed.race_scores,
            body_scores: seed.body_scores,
        };
        self.labels.upsert(record.clone())?;
        self.outcomes.insert(record.image, outcome);
        self.position += 1;
        Ok(true)
    }

    pub fn next(&mut self) -> bool {
        if self.position < self.seeds.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn previous(&mut self) -> bool {
        if self.position > 0 {
            self.position -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::uniform_race_scores;
    use tempfile::TempDir;

    fn seeds(n: usize) -> Vec<SeedRecord> {
        (0..n)
            .map(|i| SeedRecord {
                image: format!("{}.png", i),
                race_scores: uniform_race_scores(),
                body_scores: [0.0, 1.0, 0.0],
            })
            .collect()
    }

    #[test]
    fn test_resumes_at_first_unlabeled() {
        let dir = TempDir::new().unwrap();
        let table = VerdictTable::open(dir.path().join("alice.csv"));
        let mut labeler = SeedLabeler::new(seeds(3), table, dir.path().to_path_buf()).unwrap();
        assert_eq!(labeler.position(), 0);
        assert!(labeler.label(0.5).unwrap());
        assert!(labeler.label(2.0).unwrap());

        let table = VerdictTable::open(dir.path().join("alice.csv"));
        let labeler = SeedLabeler::new(seeds(3), table, dir.path().to_path_buf()).unwrap();
        assert_eq!(labeler.position(), 2);
        assert_eq!(labeler.labeled_count(), 2);
        assert!(!labeler.is_complete());
        assert_eq!(labeler.current_image_path(), Some(dir.path().join("2.png")));
        drop(labeler);

        let stored = VerdictTable::open(dir.path().join("alice.csv"))
            .get("1.png")
            .unwrap()
            .unwrap();
        assert_eq!(stored.outcome, 1.0);
    }

    #[test]
    fn test_relabel_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.csv");
        let mut labeler =
            SeedLabeler::new(seeds(2), VerdictTable::open(&path), dir.path().to_path_buf())
                .unwrap();
        labeler.label(0.2).unwrap();
        assert!(labeler.previous());
        assert!((labeler.current_outcome() - 0.2).abs() < 1e-6);
        labeler.label(-0.4).unwrap();
        labeler.label(0.9).unwrap();

        assert!(labeler.is_complete());
        assert!(labeler.current().is_none());
        assert!(!labeler.label(0.0).unwrap());
        let rows = VerdictTable::open(&path).records().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].outcome, -0.4);
    }

    #[test]
    fn test_seed_index_from_csv() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SEED_INDEX_FILE),
            "image,race_scores,obese_scores\n\
             0.png,\"[0.1 0.1 0.1 0.1 0.2 0.2 0.2]\",\"[0.2 0.3 0.5]\"\n",
        )
        .unwrap();
        let seeds = load_seed_index(dir.path()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert!((seeds[0].body_scores[2] - 0.5).abs() < 1e-6);
    }
}
