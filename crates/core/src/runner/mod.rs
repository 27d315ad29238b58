//! Sequential batch execution over the ledger's jobs.

mod summary;

pub use summary::{format_bytes, RunSummary};

use summary::describe_result;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::config::RunSettings;
use crate::factory::{FactoryError, JobFactory};
use crate::fs::{self, FsError};
use crate::job::{FailureReason, JobOptions, JobResult, JobState};
use crate::ledger::{JobLedger, Ledger, LedgerError};
use crate::output::OutputSink;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Failed to enumerate sources: {0}")]
    Enumeration(#[from] FsError),

    #[error("Invalid job configuration: {0}")]
    Factory(#[from] FactoryError),
}

/// Enumerates the sources of `settings` and builds the initial ledger of a
/// new run.
pub async fn plan_run(name: &str, settings: RunSettings) -> Result<Ledger, RunnerError> {
    let sources =
        fs::collect_files(&settings.source_root, settings.max_depth, &settings.extensions).await?;
    let jobs = JobFactory::make_all(settings.task, &sources, &settings)?;
    info!(
        "Planned {} {} jobs under {}",
        jobs.len(),
        settings.task,
        settings.source_root.display()
    );
    Ok(Ledger::new(name, settings, jobs))
}

/// Requests a cooperative stop of a running [`BatchRunner`].
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    stop: Arc<AtomicBool>,
}

impl RunnerHandle {
    /// The runner stops before starting its next job.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("Stop requested, finishing after the current job");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Runs every job of a ledger in order, one at a time.
pub struct BatchRunner {
    ledger: Arc<JobLedger>,
    factory: JobFactory,
    sink: Arc<dyn OutputSink>,
    stop: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(ledger: Arc<JobLedger>, factory: JobFactory, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            ledger,
            factory,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Completed jobs are skipped. Running and failed jobs are cleaned up
    /// and re-executed. Per-job failures never abort the run; ledger errors
    /// do.
    pub async fn run(&self) -> Result<RunSummary, RunnerError> {
        let jobs = self.ledger.jobs().await;
        let total = jobs.len();
        let mut summary = RunSummary::default();

        info!("Running {} jobs from {}", total, self.ledger.path().display());

        for (index, mut options) in jobs.into_iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                summary.stopped = true;
                break;
            }

            match options.state {
                JobState::Completed => {
                    debug!("Job {} already completed", options.job_id);
                    summary.already_completed += 1;
                    continue;
                }
                JobState::Running | JobState::Error => {
                    self.prepare_resume(&mut options).await?;
                    summary.resumed += 1;
                }
                JobState::Pending => {}
            }

            options.mark_running();
            self.ledger.update_job(&options).await?;
            self.sink.write_line(&format!(
                "[{}/{}] {} {}",
                index + 1,
                total,
                options.task.kind(),
                options.source.full_path.display()
            ));

            let result = self.execute(options.clone()).await;
            summary.count(&result);
            self.sink.write_line(&format!("  {}", describe_result(&result)));

            options.record(result);
            self.ledger.update_job(&options).await?;
        }

        summary.stats = self.ledger.stats().await;
        if summary.stopped {
            warn!("Run stopped before all jobs finished");
        }
        for line in summary.report_lines(&self.ledger.jobs().await) {
            self.sink.write_line(&line);
        }

        self.sink.flush();
        self.ledger.flush().await?;
        Ok(summary)
    }

    async fn prepare_resume(&self, options: &mut JobOptions) -> Result<(), RunnerError> {
        info!(
            "Resuming job {} ({}) for {}",
            options.job_id,
            options.state,
            options.source.full_path.display()
        );
        let job = self.factory.build(options.clone());
        job.cleanup_after_interruption().await;
        options.reset_to_pending();
        self.ledger.update_job(options).await?;
        Ok(())
    }

    /// Executes one job on its own task so that a panic inside it is
    /// recorded instead of unwinding through the run.
    async fn execute(&self, options: JobOptions) -> JobResult {
        let size_before = options.source.size;
        let job = self.factory.build(options);
        let handle = tokio::spawn(async move { job.execute().await });
        let _abort = AbortOnDrop(handle.abort_handle());

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Job failed unexpectedly: {}", e);
                JobResult::failure(FailureReason::Unexpected, e.to_string(), size_before)
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                error!("Job panicked: {}", message);
                JobResult::failure(FailureReason::Unexpected, message, size_before)
            }
            Err(e) => JobResult::failure(FailureReason::Unexpected, e.to_string(), size_before),
        }
    }
}

/// Aborts the job task if the run future is dropped mid-job.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}
