use crate::job::{JobOptions, JobResult, JobState};
use crate::ledger::LedgerStats;

/// What one call to `BatchRunner::run` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Jobs executed in this run.
    pub executed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Jobs found completed and not re-executed.
    pub already_completed: usize,
    /// Running or failed jobs that were cleaned up and re-queued.
    pub resumed: usize,
    /// The run ended on a stop request.
    pub stopped: bool,
    /// Ledger stats at the end of the run.
    pub stats: LedgerStats,
}

impl RunSummary {
    pub(super) fn count(&mut self, result: &JobResult) {
        self.executed += 1;
        if !result.success {
            self.failed += 1;
        } else if result.skipped {
            self.skipped += 1;
        } else {
            self.succeeded += 1;
        }
    }

    /// Human-readable end-of-run report.
    pub fn report_lines(&self, jobs: &[JobOptions]) -> Vec<String> {
        let stats = &self.stats;
        let mut lines = vec![format!(
            "Done: {} jobs, {} completed, {} failed ({:.1}% done)",
            stats.num_jobs, stats.num_completed_jobs, stats.num_failed_jobs, stats.percent_done
        )];
        lines.push(format!(
            "This run: {} succeeded, {} skipped, {} failed, {} already completed",
            self.succeeded, self.skipped, self.failed, self.already_completed
        ));
        if stats.size_before > 0 {
            lines.push(format!(
                "Size: {} -> {} ({:+.1}%)",
                format_bytes(stats.size_before),
                format_bytes(stats.size_after),
                stats.percent_size_change
            ));
        }
        if self.stopped {
            lines.push(format!(
                "Stopped early, {} jobs remaining",
                stats.num_remaining_jobs()
            ));
        }

        let failed: Vec<&JobOptions> = jobs
            .iter()
            .filter(|j| j.state == JobState::Error)
            .collect();
        if !failed.is_empty() {
            lines.push("Failed jobs:".to_string());
            for job in failed {
                let reason = job
                    .result
                    .as_ref()
                    .map(describe_result)
                    .unwrap_or_else(|| "failed".to_string());
                lines.push(format!(
                    "  {} {}: {}",
                    job.job_id,
                    job.source.full_path.display(),
                    reason
                ));
            }
        }
        lines
    }
}

/// One-line status of a finished job.
pub(crate) fn describe_result(result: &JobResult) -> String {
    if !result.success {
        let reason = result
            .failure_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "failed".to_string());
        return match &result.failure_detail {
            Some(detail) if !detail.is_empty() => format!("failed: {}: {}", reason, detail),
            _ => format!("failed: {}", reason),
        };
    }
    if result.skipped {
        return format!(
            "skipped: {}",
            result.skip_reason.as_deref().unwrap_or("no reason given")
        );
    }
    let secs = result.elapsed_ms as f64 / 1000.0;
    if result.size_after > 0 {
        format!(
            "ok in {:.1}s, {} -> {}",
            secs,
            format_bytes(result.size_before),
            format_bytes(result.size_after)
        )
    } else {
        format!("ok in {:.1}s", secs)
    }
}

/// Formats a byte count with a binary unit.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
