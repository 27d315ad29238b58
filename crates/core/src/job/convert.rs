//! The convert task.

use futures::future;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::progress::{select_strategy, ProgressStrategy};
use super::types::{ConvertOptions, FailureReason, JobResult};
use super::{Job, JobError};
use crate::converter::ConvertRequest;
use crate::factory::{has_temp_token, strip_temp_token};
use crate::fs;
use crate::output::OutputSink;
use crate::process::{CommandEvent, CommandId};

/// How an existing target was resolved.
pub(super) enum ExistingTarget {
    /// Nothing at the target path, go ahead.
    Clear,
    Skip(String),
    Fail(String),
}

/// Applies the clobber and skip rules to `target`.
///
/// After a clobber delete the path is checked again rather than trusting
/// the delete outcome.
pub(super) async fn resolve_existing_target(
    target: &Path,
    allow_clobber: bool,
    skip_existing: bool,
) -> ExistingTarget {
    if !fs::exists(target).await {
        return ExistingTarget::Clear;
    }

    if allow_clobber {
        debug!("Clobbering existing target {}", target.display());
        if !fs::safe_unlink(target).await {
            warn!(
                "Could not delete existing target {}, treating it as present",
                target.display()
            );
        }
        if !fs::exists(target).await {
            return ExistingTarget::Clear;
        }
    }

    if skip_existing {
        ExistingTarget::Skip(format!("target {} already exists", target.display()))
    } else {
        ExistingTarget::Fail(format!(
            "target {} already exists and clobbering is not allowed",
            target.display()
        ))
    }
}

impl Job {
    pub(super) async fn run_convert(
        &self,
        options: &ConvertOptions,
    ) -> Result<JobResult, JobError> {
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

        let mut result = JobResult {
            size_before,
            target_path: Some(final_target.clone()),
            ..Default::default()
        };

        // Source integrity
        let check = self.converter.check_integrity(source).await;
        result.source_metadata = check.metadata.clone();
        if !check.success {
            return Ok(fail(
                result,
                FailureReason::SourceIntegrityCheckFailed,
                check.error.unwrap_or_default(),
            ));
        }
        result.source_verdict = Some(check.verdict.clone());
        if !check.verdict.is_good {
            return Ok(fail(
                result,
                FailureReason::SourceCorrupt,
                format!("source failed integrity check: {}", check.verdict.describe()),
            ));
        }

        // Codec skip
        if !options.skip_video_codec_names.is_empty() {
            let codec = result
                .source_metadata
                .as_ref()
                .and_then(|m| m.primary_video_stream())
                .map(|s| s.codec_name.clone().unwrap_or_default());
            let Some(codec) = codec else {
                return Ok(fail(
                    result,
                    FailureReason::NoVideoStream,
                    format!("no video stream in {}", source.display()),
                ));
            };
            if options
                .skip_video_codec_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&codec))
            {
                return Ok(skip(
                    result,
                    format!("video codec {} is in the skip list", codec),
                ));
            }
        }

        // Existing target
        match resolve_existing_target(
            target,
            options.allow_clobber_existing,
            options.skip_convert_existing,
        )
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

        // Transcode
        let strategy = select_strategy(
            self.sink.supports_progressive_updates(),
            result
                .source_metadata
                .as_ref()
                .and_then(|m| m.known_duration_secs()),
            result
                .source_metadata
                .as_ref()
                .and_then(|m| m.known_frame_count()),
        );
        let command_id = CommandId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        let request = ConvertRequest {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            settings: options.settings.clone(),
            command_id: command_id.clone(),
        };

        info!("Converting {} -> {}", source.display(), target.display());
        let (outcome, ()) = future::join(
            self.converter.convert(request, Some(tx)),
            render_progress(rx, &command_id, strategy, self.sink.as_ref()),
        )
        .await;

        if !outcome.success {
            fs::safe_unlink(target).await;
            return Ok(fail(
                result,
                FailureReason::ConvertFailed,
                outcome.error.unwrap_or_else(|| "transcode failed".to_string()),
            ));
        }

        // Target integrity
        let check = self.converter.check_integrity(target).await;
        result.target_metadata = check.metadata.clone();
        if !check.success {
            return Ok(fail(
                result,
                FailureReason::TargetIntegrityCheckFailed,
                check.error.unwrap_or_default(),
            ));
        }
        result.target_verdict = Some(check.verdict.clone());
        if !check.verdict.is_good {
            if options.keep_invalid_convert_result {
                debug!("Keeping invalid result {}", target.display());
            } else {
                fs::safe_unlink(target).await;
            }
            return Ok(fail(
                result,
                FailureReason::TargetCorrupt,
                format!("target failed integrity check: {}", check.verdict.describe()),
            ));
        }

        // Temp-token rename
        if has_temp_token(target) {
            if let Err(e) = fs::rename(target, &final_target).await {
                fs::safe_unlink(target).await;
                return Ok(fail(result, FailureReason::RenameFailed, e.to_string()));
            }
            let recheck = self.converter.check_integrity(&final_target).await;
            if !recheck.success || !recheck.verdict.is_good {
                // The source has already been replaced; keep what we have.
                warn!(
                    "Renamed target {} failed re-check: {}",
                    final_target.display(),
                    recheck
                        .error
                        .clone()
                        .unwrap_or_else(|| recheck.verdict.describe())
                );
            }
            if recheck.metadata.is_some() {
                result.target_metadata = recheck.metadata;
            }
            result.target_verdict = Some(recheck.verdict);
        }

        let size_after = match fs::file_size(&final_target).await {
            Ok(size) => size,
            Err(_) => result
                .target_metadata
                .as_ref()
                .and_then(|m| m.size_bytes)
                .unwrap_or(0),
        };
        result.size_after = size_after;
        result.size_delta = size_after as i64 - size_before as i64;
        result.success = true;

        if options.delete_source_after_convert && final_target.as_path() != source {
            if fs::safe_unlink(source).await {
                debug!("Deleted source {}", source.display());
            } else {
                warn!("Converted, but could not delete source {}", source.display());
            }
        }

        Ok(result)
    }
}

/// Feeds this transcode's output lines to `strategy` until the sender
/// side closes.
async fn render_progress(
    mut rx: mpsc::UnboundedReceiver<CommandEvent>,
    command_id: &CommandId,
    mut strategy: Box<dyn ProgressStrategy>,
    sink: &dyn OutputSink,
) {
    while let Some(event) = rx.recv().await {
        if event.command_id() != command_id {
            continue;
        }
        if let CommandEvent::MessageReceived { line, .. } = event {
            if let Some(text) = strategy.on_progress_message(&line) {
                sink.write(&text);
            }
        }
    }
}

pub(super) fn fail(
    mut result: JobResult,
    reason: FailureReason,
    detail: impl Into<String>,
) -> JobResult {
    let detail = detail.into();
    debug!("Job failed ({}): {}", reason, detail);
    result.success = false;
    result.failure_reason = Some(reason);
    result.failure_detail = Some(detail);
    result.size_after = 0;
    result.size_delta = 0;
    result
}

pub(super) fn skip(mut result: JobResult, reason: impl Into<String>) -> JobResult {
    let reason = reason.into();
    debug!("Job skipped: {}", reason);
    result.success = true;
    result.skipped = true;
    result.skip_reason = Some(reason);
    result.size_after = 0;
    result.size_delta = 0;
    result
}
