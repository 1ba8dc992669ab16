use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StoreError;

/// Append/rewrite/query access to an ordered table of records.
///
/// Row order is insertion order; structural changes go through a full
/// [`rewrite`](TableStore::rewrite).
pub trait TableStore<R> {
    /// Returns every row, oldest first. A table that was never written is empty.
    fn load(&self) -> Result<Vec<R>, StoreError>;

    fn append(&self, record: &R) -> Result<(), StoreError>;

    /// Replaces the whole table with `records`.
    fn rewrite(&self, records: &[R]) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.load()?.len())
    }
}

/// A CSV file with a fixed header row.
#[derive(Debug, Clone)]
pub struct CsvTable<R> {
    path: PathBuf,
    header: &'static [&'static str],
    _record: PhantomData<fn() -> R>,
}

impl<R> CsvTable<R> {
    pub fn new(path: impl Into<PathBuf>, header: &'static [&'static str]) -> Self {
        Self {
            path: path.into(),
            header,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_blank(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true)
    }

    /// Creates the file with just its header if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.is_blank() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&self.path)?;
            writer.write_record(self.header)?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl<R: Serialize + DeserializeOwned> TableStore<R> for CsvTable<R> {
    fn load(&self) -> Result<Vec<R>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn append(&self, record: &R) -> Result<(), StoreError> {
        self.ensure_exists()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    fn rewrite(&self, records: &[R]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&tmp)?;
            writer.write_record(self.header)?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
