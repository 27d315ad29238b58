//! Integrity rules for media files.

use std::path::Path;
use tracing::debug;

use super::traits::VideoConverter;
use super::types::{IntegrityIssue, IntegrityOutcome, IntegrityVerdict, MediaMetadata};
use crate::fs;

/// Video codec names that denote unencoded frames.
const RAW_VIDEO_CODECS: &[&str] = &["rawvideo"];

/// Checks a file with `converter`.
///
/// Missing and empty files are judged without probing. A failed probe makes
/// the whole check unsuccessful.
pub async fn check_file<C>(converter: &C, path: &Path) -> IntegrityOutcome
where
    C: VideoConverter + ?Sized,
{
    if !fs::exists(path).await {
        return IntegrityOutcome::checked(
            IntegrityVerdict::from_issues([IntegrityIssue::FileMissing]),
            None,
        );
    }

    match fs::file_size(path).await {
        Ok(0) => {
            return IntegrityOutcome::checked(
                IntegrityVerdict::from_issues([IntegrityIssue::ZeroSize]),
                None,
            )
        }
        Ok(_) => {}
        Err(e) => return IntegrityOutcome::failed(e.to_string()),
    }

    let probe = converter.probe(path).await;
    let metadata = match probe.metadata {
        Some(metadata) if probe.success => metadata,
        _ => {
            let error = probe
                .error
                .unwrap_or_else(|| "probe returned no metadata".to_string());
            debug!("Integrity check of {} failed: {}", path.display(), error);
            return IntegrityOutcome::failed(error);
        }
    };

    let verdict = evaluate(&metadata);
    debug!(
        "Integrity of {}: {}",
        path.display(),
        verdict.describe()
    );
    IntegrityOutcome::checked(verdict, Some(metadata))
}

/// Evaluates the metadata rules in order.
pub fn evaluate(metadata: &MediaMetadata) -> IntegrityVerdict {
    let mut issues = Vec::new();

    if !metadata.has_container_info() {
        issues.push(IntegrityIssue::MissingContainerInfo);
    }

    match metadata.primary_video_stream() {
        None => issues.push(IntegrityIssue::MissingVideoStream),
        Some(stream) => {
            let is_raw = stream
                .codec_name
                .as_deref()
                .map(|c| RAW_VIDEO_CODECS.iter().any(|r| c.eq_ignore_ascii_case(r)))
                .unwrap_or(false);
            if is_raw {
                issues.push(IntegrityIssue::RawVideoCodec);
            }
        }
    }

    if metadata.primary_audio_stream().is_none() {
        issues.push(IntegrityIssue::MissingAudioStream);
    }

    IntegrityVerdict::from_issues(issues)
}
