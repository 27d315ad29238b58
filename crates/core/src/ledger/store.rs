//! Dirty-tracked, write-back ledger persistence.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::LedgerError;
use super::types::{Ledger, LedgerStats};
use crate::config::RunSettings;
use crate::fs;
use crate::job::JobOptions;

struct LedgerState {
    ledger: Ledger,
    dirty: bool,
}

/// The job ledger of a run.
///
/// Updates only touch memory and mark the ledger dirty. A background task
/// flushes dirty state every `flush_interval`; [`JobLedger::shutdown`] stops
/// that task and performs the final flush.
pub struct JobLedger {
    path: PathBuf,
    state: Arc<Mutex<LedgerState>>,
    resumed: bool,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl JobLedger {
    /// Loads an existing ledger file.
    pub async fn load(path: &Path, flush_interval: Duration) -> Result<Self, LedgerError> {
        let content = fs::read_file(path).await?;
        let mut ledger: Ledger =
            serde_json::from_str(&content).map_err(|e| LedgerError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        ledger.refresh_stats();

        info!(
            "Loaded ledger {} with {} jobs ({} completed, {} failed)",
            path.display(),
            ledger.stats.num_jobs,
            ledger.stats.num_completed_jobs,
            ledger.stats.num_failed_jobs
        );

        Ok(Self::start(path, ledger, true, flush_interval))
    }

    /// Creates a ledger from `initial` and writes it immediately.
    pub async fn create(
        path: &Path,
        initial: Ledger,
        flush_interval: Duration,
    ) -> Result<Self, LedgerError> {
        let ledger = Self::start(path, initial, false, flush_interval);
        ledger.state.lock().await.dirty = true;
        ledger.flush().await?;
        info!("Created ledger {}", path.display());
        Ok(ledger)
    }

    /// Loads the ledger at `path` if it exists, otherwise creates it from
    /// the ledger built by `initial`.
    pub async fn open<F, Fut, E>(
        path: &Path,
        flush_interval: Duration,
        initial: F,
    ) -> Result<Self, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Ledger, E>>,
        E: From<LedgerError>,
    {
        if fs::exists(path).await {
            return Ok(Self::load(path, flush_interval).await?);
        }
        let ledger = initial().await?;
        Ok(Self::create(path, ledger, flush_interval).await?)
    }

    fn start(path: &Path, ledger: Ledger, resumed: bool, flush_interval: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(Mutex::new(LedgerState {
            ledger,
            dirty: false,
        }));

        let handle = spawn_flush_task(
            Arc::clone(&state),
            path.to_path_buf(),
            flush_interval,
            shutdown_tx.subscribe(),
        );

        Self {
            path: path.to_path_buf(),
            state,
            resumed,
            stopped: AtomicBool::new(false),
            shutdown_tx,
            flush_task: Mutex::new(Some(handle)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the ledger was loaded from an existing file.
    pub fn was_resumed(&self) -> bool {
        self.resumed
    }

    /// Replaces the job with the same id and recomputes the stats.
    pub async fn update_job(&self, job: &JobOptions) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        let slot = state
            .ledger
            .jobs
            .iter_mut()
            .find(|j| j.job_id == job.job_id)
            .ok_or(LedgerError::UnknownJob(job.job_id))?;
        *slot = job.clone();
        state.ledger.refresh_stats();
        state.dirty = true;
        Ok(())
    }

    /// Writes the ledger if it changed since the last flush. Returns whether
    /// a write happened.
    pub async fn flush(&self) -> Result<bool, LedgerError> {
        flush_state(&self.state, &self.path).await
    }

    /// Stops the periodic flush task and flushes. Safe to call repeatedly.
    pub async fn shutdown(&self) -> Result<bool, LedgerError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
            if let Some(handle) = self.flush_task.lock().await.take() {
                if let Err(e) = handle.await {
                    warn!("Ledger flush task ended abnormally: {}", e);
                }
            }
            debug!("Stopped ledger flush task");
        }
        self.flush().await
    }

    pub async fn snapshot(&self) -> Ledger {
        self.state.lock().await.ledger.clone()
    }

    pub async fn jobs(&self) -> Vec<JobOptions> {
        self.state.lock().await.ledger.jobs.clone()
    }

    pub async fn job(&self, job_id: Uuid) -> Option<JobOptions> {
        self.state
            .lock()
            .await
            .ledger
            .jobs
            .iter()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    pub async fn stats(&self) -> LedgerStats {
        self.state.lock().await.ledger.stats.clone()
    }

    pub async fn settings(&self) -> RunSettings {
        self.state.lock().await.ledger.settings.clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }
}

impl Drop for JobLedger {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn flush_state(state: &Mutex<LedgerState>, path: &Path) -> Result<bool, LedgerError> {
    let mut state = state.lock().await;
    if !state.dirty {
        return Ok(false);
    }

    state.ledger.updated_at = Utc::now();
    let json = serde_json::to_string_pretty(&state.ledger)?;
    fs::write_file_atomic(path, &json).await?;
    state.dirty = false;

    debug!("Flushed ledger to {}", path.display());
    Ok(true)
}

fn spawn_flush_task(
    state: Arc<Mutex<LedgerState>>,
    path: PathBuf,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = flush_state(&state, &path).await {
                        warn!("Periodic ledger flush failed: {}", e);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileDescriptor;
    use crate::job::{FailureReason, JobResult, JobState, JobTask};
    use tempfile::TempDir;

    const SLOW: Duration = Duration::from_secs(3600);

    fn initial_ledger(count: usize) -> Ledger {
        let root = Path::new("/videos");
        let jobs = (0..count)
            .map(|i| {
                JobOptions::new(
                    JobTask::Probe,
                    FileDescriptor::new(&root.join(format!("{}.avi", i)), root, 100),
                )
            })
            .collect();
        let settings = RunSettings {
            source_root: root.to_path_buf(),
            ..Default::default()
        };
        Ledger::new("test run", settings, jobs)
    }

    async fn read_back(path: &Path) -> Ledger {
        let content = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = JobLedger::create(&path, initial_ledger(2), SLOW)
            .await
            .unwrap();
        assert!(!ledger.was_resumed());
        assert!(!ledger.is_dirty().await);

        let on_disk = read_back(&path).await;
        assert_eq!(on_disk.jobs.len(), 2);
        assert_eq!(on_disk.name, "test run");
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_marks_dirty_without_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JobLedger::create(&path, initial_ledger(2), SLOW)
            .await
            .unwrap();

        let mut job = ledger.jobs().await[0].clone();
        job.record(JobResult::failure(FailureReason::ProbeFailed, "bad", 100));
        ledger.update_job(&job).await.unwrap();

        assert!(ledger.is_dirty().await);
        let stats = ledger.stats().await;
        assert_eq!(stats.num_failed_jobs, 1);
        assert_eq!(stats.failed_job_ids, vec![job.job_id]);
        assert_eq!(stats.percent_done, 50.0);

        let on_disk = read_back(&path).await;
        assert_eq!(on_disk.jobs[0].state, JobState::Pending);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_is_noop_when_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JobLedger::create(&path, initial_ledger(1), SLOW)
            .await
            .unwrap();

        assert!(!ledger.flush().await.unwrap());

        let mut job = ledger.jobs().await[0].clone();
        job.mark_running();
        ledger.update_job(&job).await.unwrap();

        assert!(ledger.flush().await.unwrap());
        assert!(!ledger.flush().await.unwrap());

        let on_disk = read_back(&path).await;
        assert_eq!(on_disk.jobs, ledger.snapshot().await.jobs);
        assert_eq!(on_disk.jobs[0].state, JobState::Running);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_unknown_job_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JobLedger::create(&path, initial_ledger(1), SLOW)
            .await
            .unwrap();

        let stranger = initial_ledger(1).jobs.remove(0);
        let err = ledger.update_job(&stranger).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownJob(id) if id == stranger.job_id));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_prefers_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let first = JobLedger::create(&path, initial_ledger(3), SLOW)
            .await
            .unwrap();
        let id = first.snapshot().await.ledger_id;
        first.shutdown().await.unwrap();

        let reopened = JobLedger::open(&path, SLOW, || async {
            Ok::<_, LedgerError>(initial_ledger(1))
        })
        .await
        .unwrap();
        assert!(reopened.was_resumed());
        let snapshot = reopened.snapshot().await;
        assert_eq!(snapshot.ledger_id, id);
        assert_eq!(snapshot.jobs.len(), 3);
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.json");

        let ledger = JobLedger::open(&path, SLOW, || async {
            Ok::<_, LedgerError>(initial_ledger(2))
        })
        .await
        .unwrap();
        assert!(!ledger.was_resumed());
        assert!(path.exists());
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = JobLedger::load(&path, SLOW).await.err().unwrap();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_periodic_flush_writes_dirty_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JobLedger::create(&path, initial_ledger(1), Duration::from_millis(20))
            .await
            .unwrap();

        let mut job = ledger.jobs().await[0].clone();
        job.mark_running();
        ledger.update_job(&job).await.unwrap();

        let mut flushed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !ledger.is_dirty().await {
                flushed = true;
                break;
            }
        }
        assert!(flushed);
        assert_eq!(read_back(&path).await.jobs[0].state, JobState::Running);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = JobLedger::create(&path, initial_ledger(1), SLOW)
            .await
            .unwrap();

        let mut job = ledger.jobs().await[0].clone();
        job.record(JobResult {
            success: true,
            ..Default::default()
        });
        ledger.update_job(&job).await.unwrap();

        assert!(ledger.shutdown().await.unwrap());
        assert!(!ledger.shutdown().await.unwrap());
        assert_eq!(read_back(&path).await.stats.num_completed_jobs, 1);
    }
}
