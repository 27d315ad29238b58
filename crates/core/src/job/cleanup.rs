//! Removal of artifacts left by an interrupted or failed job.

use chrono::Duration;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::FailureReason;
use super::Job;
use crate::factory::{has_temp_token, strip_temp_token};
use crate::fs;

/// Tolerance for coarse filesystem timestamps.
const MTIME_SLACK_SECS: i64 = 2;

impl Job {
    /// Deletes files this job may have created before it was interrupted.
    ///
    /// The temp-token path is always removed. The final target is removed
    /// only when the recorded failure happened after writing it, or when
    /// there is no result (or an `Unexpected` one) and the file was
    /// modified at or after the job's start, give or take the timestamp
    /// granularity. The source path is
    /// never removed. Returns the deleted paths.
    pub async fn cleanup_after_interruption(&self) -> Vec<PathBuf> {
        let mut deleted = Vec::new();
        let Some(target) = self.options.target_path() else {
            return deleted;
        };
        let source = self.options.source.full_path.as_path();

        if has_temp_token(target) && fs::exists(target).await && fs::safe_unlink(target).await {
            deleted.push(target.to_path_buf());
        }

        let final_target = strip_temp_token(target).unwrap_or_else(|| target.to_path_buf());
        if final_target.as_path() == source || !fs::exists(&final_target).await {
            return deleted;
        }

        let reason = self.options.result.as_ref().map(|r| r.failure_reason);
        let created_by_job = match reason {
            Some(Some(reason)) if reason.target_may_exist() => true,
            None | Some(Some(FailureReason::Unexpected)) => {
                self.modified_since_start(&final_target).await
            }
            Some(_) => false,
        };

        if created_by_job {
            if fs::safe_unlink(&final_target).await {
                deleted.push(final_target);
            }
        } else {
            debug!(
                "Leaving {} in place, not created by job {}",
                final_target.display(),
                self.options.job_id
            );
        }

        if !deleted.is_empty() {
            info!(
                "Cleaned up {} file(s) of job {}",
                deleted.len(),
                self.options.job_id
            );
        }
        deleted
    }

    async fn modified_since_start(&self, path: &Path) -> bool {
        match (self.options.started_at, fs::modified_at(path).await) {
            (Some(started_at), Some(modified)) => {
                modified >= started_at - Duration::seconds(MTIME_SLACK_SECS)
            }
            _ => false,
        }
    }
}
