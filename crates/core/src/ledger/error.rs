use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::fs::FsError;

/// Ledger I/O errors. These abort the run.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Ledger {path} is not valid: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Job {0} is not in the ledger")]
    UnknownJob(Uuid),
}
