use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunSettings;
use crate::job::{JobOptions, JobState};

/// Persisted record of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub ledger_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Settings the run was created with. Authoritative on resume.
    pub settings: RunSettings,
    pub jobs: Vec<JobOptions>,
    #[serde(default)]
    pub stats: LedgerStats,
}

impl Ledger {
    pub fn new(name: impl Into<String>, settings: RunSettings, jobs: Vec<JobOptions>) -> Self {
        let now = Utc::now();
        let stats = LedgerStats::fold(&jobs);
        Self {
            ledger_id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            settings,
            jobs,
            stats,
        }
    }

    /// Recomputes `stats` from the job list.
    pub fn refresh_stats(&mut self) {
        self.stats = LedgerStats::fold(&self.jobs);
    }
}

/// Run-wide aggregates. Always a fold over the job list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub num_jobs: usize,
    pub num_completed_jobs: usize,
    pub num_failed_jobs: usize,
    pub failed_job_ids: Vec<Uuid>,
    /// Source bytes of processed jobs.
    pub size_before: u64,
    /// Target bytes of processed jobs.
    pub size_after: u64,
    pub percent_size_change: f64,
    pub total_duration_ms: u64,
    pub percent_done: f64,
}

impl LedgerStats {
    pub fn fold(jobs: &[JobOptions]) -> Self {
        let mut stats = Self {
            num_jobs: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            match job.state {
                JobState::Completed => stats.num_completed_jobs += 1,
                JobState::Error => {
                    stats.num_failed_jobs += 1;
                    stats.failed_job_ids.push(job.job_id);
                }
                JobState::Pending | JobState::Running => {}
            }

            if let Some(result) = &job.result {
                stats.total_duration_ms += result.elapsed_ms;
                if job.is_processed() {
                    stats.size_before += result.size_before;
                    stats.size_after += result.size_after;
                }
            }
        }

        if stats.size_before > 0 {
            stats.percent_size_change = (stats.size_after as f64 - stats.size_before as f64)
                / stats.size_before as f64
                * 100.0;
        }
        if stats.num_jobs > 0 {
            stats.percent_done = (stats.num_completed_jobs + stats.num_failed_jobs) as f64
                / stats.num_jobs as f64
                * 100.0;
        }

        stats
    }

    /// Jobs that are neither completed nor failed.
    pub fn num_remaining_jobs(&self) -> usize {
        self.num_jobs - self.num_completed_jobs - self.num_failed_jobs
    }
}
