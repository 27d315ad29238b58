//! Job options, states and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::converter::{ConvertSettings, IntegrityVerdict, MediaMetadata};
use crate::fs::FileDescriptor;

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Convert,
    Probe,
    IntegrityCheck,
    Copy,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Probe => "probe",
            Self::IntegrityCheck => "integrity_check",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "convert" => Ok(Self::Convert),
            "probe" => Ok(Self::Probe),
            "integrity_check" | "check" => Ok(Self::IntegrityCheck),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown task: {}", other)),
        }
    }
}

/// Options of a convert job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Resolved target path, possibly temp-token prefixed.
    pub target: PathBuf,
    #[serde(flatten)]
    pub settings: ConvertSettings,
    #[serde(default)]
    pub allow_clobber_existing: bool,
    #[serde(default)]
    pub skip_convert_existing: bool,
    #[serde(default)]
    pub delete_source_after_convert: bool,
    #[serde(default)]
    pub keep_invalid_convert_result: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_video_codec_names: Vec<String>,
}

/// Options of a copy job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    pub target: PathBuf,
    #[serde(default)]
    pub allow_clobber_existing: bool,
    #[serde(default)]
    pub skip_existing: bool,
}

/// The task of a job together with its command options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "options", rename_all = "snake_case")]
pub enum JobTask {
    Convert(ConvertOptions),
    Probe,
    IntegrityCheck,
    Copy(CopyOptions),
}

impl JobTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Convert(_) => TaskKind::Convert,
            Self::Probe => TaskKind::Probe,
            Self::IntegrityCheck => TaskKind::IntegrityCheck,
            Self::Copy(_) => TaskKind::Copy,
        }
    }

    /// Target path for tasks that write one.
    pub fn target_path(&self) -> Option<&Path> {
        match self {
            Self::Convert(options) => Some(&options.target),
            Self::Copy(options) => Some(&options.target),
            Self::Probe | Self::IntegrityCheck => None,
        }
    }
}

/// Persisted state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Error,
}

impl JobState {
    /// Running and error jobs may have been interrupted and need cleanup.
    pub fn needs_resume(&self) -> bool {
        matches!(self, Self::Running | Self::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Why a job failed. Exactly one is recorded per failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SourceIsTarget,
    SourceIntegrityCheckFailed,
    SourceCorrupt,
    NoVideoStream,
    TargetExists,
    ConvertFailed,
    TargetIntegrityCheckFailed,
    TargetCorrupt,
    RenameFailed,
    ProbeFailed,
    CopyFailed,
    Unexpected,
}

impl FailureReason {
    /// Reasons recorded after the job had started writing its target.
    ///
    /// `Unexpected` is excluded: it can be raised at any step, so cleanup
    /// has to look at the target itself.
    pub fn target_may_exist(&self) -> bool {
        matches!(
            self,
            Self::ConvertFailed
                | Self::TargetCorrupt
                | Self::TargetIntegrityCheckFailed
                | Self::RenameFailed
                | Self::CopyFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceIsTarget => "source_is_target",
            Self::SourceIntegrityCheckFailed => "source_integrity_check_failed",
            Self::SourceCorrupt => "source_corrupt",
            Self::NoVideoStream => "no_video_stream",
            Self::TargetExists => "target_exists",
            Self::ConvertFailed => "convert_failed",
            Self::TargetIntegrityCheckFailed => "target_integrity_check_failed",
            Self::TargetCorrupt => "target_corrupt",
            Self::RenameFailed => "rename_failed",
            Self::ProbeFailed => "probe_failed",
            Self::CopyFailed => "copy_failed",
            Self::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one job execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    pub elapsed_ms: u64,
    /// Final target path, with any temp token stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_verdict: Option<IntegrityVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_metadata: Option<MediaMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_verdict: Option<IntegrityVerdict>,
    pub size_before: u64,
    pub size_after: u64,
    /// `size_after - size_before`; zero when no target was produced.
    pub size_delta: i64,
}

impl JobResult {
    /// A failed result carrying `reason` and a human-readable detail.
    pub fn failure(reason: FailureReason, detail: impl Into<String>, size_before: u64) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason),
            failure_detail: Some(detail.into()),
            size_before,
            ..Default::default()
        }
    }

    /// Whether this result counts towards size totals.
    pub fn is_processed(&self) -> bool {
        self.success && !self.skipped
    }
}

/// Persisted description of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Assigned once at creation and kept across resumes.
    pub job_id: Uuid,
    pub task: JobTask,
    pub state: JobState,
    pub source: FileDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobOptions {
    pub fn new(task: JobTask, source: FileDescriptor) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            task,
            state: JobState::Pending,
            source,
            started_at: None,
            result: None,
        }
    }

    pub fn target_path(&self) -> Option<&Path> {
        self.task.target_path()
    }

    /// Completed with a non-skipped result.
    pub fn is_processed(&self) -> bool {
        self.state == JobState::Completed
            && self.result.as_ref().map(|r| !r.skipped).unwrap_or(false)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.result.as_ref().and_then(|r| r.failure_reason)
    }

    /// Marks the job running from now. A result from an earlier attempt
    /// is dropped so it cannot describe this one.
    pub fn mark_running(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
        self.result = None;
    }

    /// Records a finished execution.
    pub fn record(&mut self, result: JobResult) {
        self.state = if result.success {
            JobState::Completed
        } else {
            JobState::Error
        };
        self.result = Some(result);
    }

    /// Puts an interrupted or failed job back in the queue. Cleanup must
    /// have run first, since it reads the previous result.
    pub fn reset_to_pending(&mut self) {
        self.state = JobState::Pending;
        self.result = None;
    }
}
