//! Persistent tables: the prediction ledger, the verdict table and the seed
//! dataset index.
//!
//! Every table lives behind [`TableStore`], so the CSV files used today can
//! be replaced by an indexed store without touching pipeline logic.

use std::io;

mod ledger;
mod records;
mod table;
mod verdicts;

pub use ledger::PredictionLedger;
pub use records::{score_vector, ImageRecord, SeedRecord, VerdictRecord};
pub use table::{CsvTable, TableStore};
pub use verdicts::VerdictTable;

pub const LEDGER_HEADER: [&str; 6] = [
    "profile",
    "image",
    "race_score",
    "obesity_score",
    "predicted_attractiveness",
    "final_decision",
];
pub const VERDICT_HEADER: [&str; 4] = ["image", "outcome", "race_scores", "obese_scores"];
pub const SEED_HEADER: [&str; 3] = ["image", "race_scores", "obese_scores"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Also carries malformed score vectors, which fail row deserialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
