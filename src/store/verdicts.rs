use std::path::PathBuf;

use super::records::VerdictRecord;
use super::table::{CsvTable, TableStore};
use super::{StoreError, VERDICT_HEADER};

/// Table of human-provided outcomes keyed by image name.
///
/// Used for the review verdicts (`user_verdicts.csv`) and for the seed
/// labels produced by manual labeling; both share one layout.
pub struct VerdictTable<T = CsvTable<VerdictRecord>> {
    table: T,
}

impl VerdictTable<CsvTable<VerdictRecord>> {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_table(CsvTable::new(path, &VERDICT_HEADER))
    }
}

impl<T: TableStore<VerdictRecord>> VerdictTable<T> {
    pub fn with_table(table: T) -> Self {
        Self { table }
    }

    pub fn records(&self) -> Result<Vec<VerdictRecord>, StoreError> {
        self.table.load()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.table.len()
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn append(&self, record: &VerdictRecord) -> Result<(), StoreError> {
        self.table.append(record)
    }

    /// Replaces the row with the same image name, or appends one.
    pub fn upsert(&self, record: VerdictRecord) -> Result<(), StoreError> {
        let mut rows = self.table.load()?;
        match rows.iter_mut().find(|r| r.image == record.image) {
            Some(existing) => {
                *existing = record;
                self.table.rewrite(&rows)
            }
            None => self.table.append(&record),
        }
    }

    pub fn get(&self, image: &str) -> Result<Option<VerdictRecord>, StoreError> {
        Ok(self.table.load()?.into_iter().find(|r| r.image == image))
    }
}
