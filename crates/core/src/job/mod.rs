//! Per-file jobs.
//!
//! A [`Job`] wraps persisted [`JobOptions`] and runs its task against a
//! [`VideoConverter`]. Jobs never touch the ledger; the batch runner records
//! what [`Job::execute`] returns.

mod cleanup;
mod convert;
pub mod progress;
mod tasks;
mod types;

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::converter::VideoConverter;
use crate::fs::FsError;
use crate::output::OutputSink;

pub use progress::{select_strategy, ProgressStrategy};
pub use types::{
    ConvertOptions, CopyOptions, FailureReason, JobOptions, JobResult, JobState, JobTask,
    TaskKind,
};

/// Errors that abort a job outside its named failure reasons.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// One unit of work on one source file.
pub struct Job {
    options: JobOptions,
    converter: Arc<dyn VideoConverter>,
    sink: Arc<dyn OutputSink>,
}

impl Job {
    pub fn new(
        options: JobOptions,
        converter: Arc<dyn VideoConverter>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            options,
            converter,
            sink,
        }
    }

    pub fn id(&self) -> Uuid {
        self.options.job_id
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Runs the task and returns its result with the elapsed time filled in.
    pub async fn execute(&self) -> Result<JobResult, JobError> {
        let start = Instant::now();
        let mut result = match &self.options.task {
            JobTask::Convert(options) => self.run_convert(options).await?,
            JobTask::Probe => self.run_probe().await,
            JobTask::IntegrityCheck => self.run_integrity_check().await,
            JobTask::Copy(options) => self.run_copy(options).await?,
        };
        result.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}
