//! The probe, integrity-check and copy tasks.

use tracing::info;

use super::convert::{fail, resolve_existing_target, skip, ExistingTarget};
use super::types::{CopyOptions, FailureReason, JobResult};
use super::{Job, JobError};
use crate::factory::{has_temp_token, strip_temp_token};
use crate::fs;

impl Job {
    pub(super) async fn run_probe(&self) -> JobResult {
        let source = &self.options.source;
        let mut result = JobResult {
            size_before: source.size,
            ..Default::default()
        };

        let probe = self.converter.probe(&source.full_path).await;
        if !probe.success {
            return fail(
                result,
                FailureReason::ProbeFailed,
                probe.error.unwrap_or_else(|| "probe failed".to_string()),
            );
        }

        result.source_metadata = probe.metadata;
        result.size_after = source.size;
        result.success = true;
        result
    }

    pub(super) async fn run_integrity_check(&self) -> JobResult {
        let source = &self.options.source;
        let mut result = JobResult {
            size_before: source.size,
            ..Default::default()
        };

        let check = self.converter.check_integrity(&source.full_path).await;
        result.source_metadata = check.metadata;
        if !check.success {
            return fail(
                result,
                FailureReason::SourceIntegrityCheckFailed,
                check.error.unwrap_or_default(),
            );
        }

        let describe = check.verdict.describe();
        let is_good = check.verdict.is_good;
        result.source_verdict = Some(check.verdict);
        if !is_good {
            return fail(result, FailureReason::SourceCorrupt, describe);
        }

        result.size_after = source.size;
        result.success = true;
        result
    }

    pub(super) async fn run_copy(&self, options: &CopyOptions) -> Result<JobResult, JobError> {
        let source = self.options.source.full_path.as_path();
        let size_before = self.options.source.size;
        let target = options.target.as_path();
        let final_target = strip_temp_token(target).unwrap_or_else(|| target.to_path_buf());

        if target == source {
            return Ok(JobResult::failure(
                FailureReason::SourceIsTarget,
                format!("target path equals source path {}", source.display()),
                size_before,
            ));
        }

        let result = JobResult {
            size_before,
            target_path: Some(final_target.clone()),
            ..Default::default()
        };

        match resolve_existing_target(target, options.allow_clobber_existing, options.skip_existing)
            .await
        {
            ExistingTarget::Clear => {}
            ExistingTarget::Skip(reason) => return Ok(skip(result, reason)),
            ExistingTarget::Fail(detail) => {
                return Ok(fail(result, FailureReason::TargetExists, detail))
            }
        }

        if let Some(parent) = target.parent() {
            fs::make_dir(parent).await?;
        }

        info!("Copying {} -> {}", source.display(), target.display());
        let bytes = match fs::copy_file(source, target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                fs::safe_unlink(target).await;
                return Ok(fail(result, FailureReason::CopyFailed, e.to_string()));
            }
        };

        if has_temp_token(target) {
            if let Err(e) = fs::rename(target, &final_target).await {
                fs::safe_unlink(target).await;
                return Ok(fail(result, FailureReason::RenameFailed, e.to_string()));
            }
        }

        Ok(JobResult {
            success: true,
            size_after: bytes,
            size_delta: bytes as i64 - size_before as i64,
            ..result
        })
    }
}
