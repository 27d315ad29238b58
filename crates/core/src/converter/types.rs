//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::process::CommandId;

/// Container value meaning "keep the source container and file name".
pub const COPY_CONTAINER: &str = "copy";

/// One stream reported by the prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    /// "video", "audio", "subtitle", "data", ...
    pub codec_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    /// Frame count, when the container records it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nb_frames: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl StreamInfo {
    pub fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type == "audio"
    }
}

/// Metadata of a media file as reported by the prober.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub path: PathBuf,
    /// Container name (first entry of ffprobe's `format_name`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl MediaMetadata {
    /// First video stream, if any.
    pub fn primary_video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.is_video())
    }

    /// First audio stream, if any.
    pub fn primary_audio_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.is_audio())
    }

    pub fn has_container_info(&self) -> bool {
        self.format_name
            .as_deref()
            .map(|f| !f.is_empty())
            .unwrap_or(false)
    }

    /// Total duration when known and positive.
    pub fn known_duration_secs(&self) -> Option<f64> {
        self.duration_secs
            .or_else(|| self.primary_video_stream().and_then(|s| s.duration_secs))
            .filter(|d| *d > 0.0)
    }

    /// Total frame count of the primary video stream when known.
    pub fn known_frame_count(&self) -> Option<u64> {
        self.primary_video_stream()
            .and_then(|s| s.nb_frames)
            .filter(|n| *n > 0)
    }
}

/// A named defect found by an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssue {
    FileMissing,
    ZeroSize,
    /// The prober could not read the file.
    Unreadable,
    MissingContainerInfo,
    MissingVideoStream,
    MissingAudioStream,
    RawVideoCodec,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FileMissing => "file missing",
            Self::ZeroSize => "zero size",
            Self::Unreadable => "unreadable",
            Self::MissingContainerInfo => "missing container info",
            Self::MissingVideoStream => "missing video stream",
            Self::MissingAudioStream => "missing audio stream",
            Self::RawVideoCodec => "raw video codec",
        };
        f.write_str(s)
    }
}

/// Pass/fail judgement over one media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityVerdict {
    pub is_good: bool,
    pub issues: BTreeSet<IntegrityIssue>,
}

impl IntegrityVerdict {
    pub fn good() -> Self {
        Self {
            is_good: true,
            issues: BTreeSet::new(),
        }
    }

    /// Builds a verdict that is good iff `issues` is empty.
    pub fn from_issues(issues: impl IntoIterator<Item = IntegrityIssue>) -> Self {
        let issues: BTreeSet<_> = issues.into_iter().collect();
        Self {
            is_good: issues.is_empty(),
            issues,
        }
    }

    pub fn has(&self, issue: IntegrityIssue) -> bool {
        self.issues.contains(&issue)
    }

    /// Comma-separated issue list, or "ok".
    pub fn describe(&self) -> String {
        if self.issues.is_empty() {
            return "ok".to_string();
        }
        self.issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Outcome of a probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub success: bool,
    pub metadata: Option<MediaMetadata>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(metadata: MediaMetadata) -> Self {
        Self {
            success: true,
            metadata: Some(metadata),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            metadata: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of an integrity check.
///
/// `success` reports whether the check itself ran; the verdict says whether
/// the file passed.
#[derive(Debug, Clone)]
pub struct IntegrityOutcome {
    pub success: bool,
    pub verdict: IntegrityVerdict,
    pub metadata: Option<MediaMetadata>,
    pub error: Option<String>,
}

impl IntegrityOutcome {
    pub fn checked(verdict: IntegrityVerdict, metadata: Option<MediaMetadata>) -> Self {
        Self {
            success: true,
            verdict,
            metadata,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            verdict: IntegrityVerdict::from_issues([IntegrityIssue::Unreadable]),
            metadata: None,
            error: Some(error.into()),
        }
    }
}

/// Codec and container options of a transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertSettings {
    /// Target container / extension, or `copy` to keep the source's.
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Hardware acceleration method passed as `-hwaccel`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwaccel: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

fn default_container() -> String {
    "mkv".to_string()
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            container: default_container(),
            video_codec: None,
            audio_codec: None,
            hwaccel: None,
            extra_args: Vec::new(),
        }
    }
}

impl ConvertSettings {
    pub fn keeps_container(&self) -> bool {
        self.container.eq_ignore_ascii_case(COPY_CONTAINER)
    }

    /// Extension for target files, `None` when the source's is kept.
    pub fn target_extension(&self) -> Option<String> {
        if self.keeps_container() {
            None
        } else {
            Some(self.container.trim_start_matches('.').to_lowercase())
        }
    }

    /// Muxer name passed as `-f`, `None` when ffmpeg should infer it.
    pub fn muxer(&self) -> Option<&'static str> {
        let ext = self.target_extension()?;
        Some(match ext.as_str() {
            "mkv" => "matroska",
            "mp4" | "m4v" => "mp4",
            "mov" => "mov",
            "webm" => "webm",
            "avi" => "avi",
            "ts" => "mpegts",
            _ => return None,
        })
    }
}

/// One transcode invocation.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub source: PathBuf,
    pub target: PathBuf,
    pub settings: ConvertSettings,
    /// Allocated by the caller so progress events can be keyed by it.
    pub command_id: CommandId,
}

/// Outcome of a transcode.
#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub success: bool,
    pub elapsed_ms: u64,
    pub command_id: CommandId,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(codec: &str) -> StreamInfo {
        StreamInfo {
            index: 0,
            codec_type: "video".into(),
            codec_name: Some(codec.into()),
            nb_frames: Some(1200),
            duration_secs: Some(50.0),
            width: Some(1920),
            height: Some(1080),
        }
    }

    #[test]
    fn test_verdict_good_iff_no_issues() {
        assert!(IntegrityVerdict::from_issues([]).is_good);
        let bad = IntegrityVerdict::from_issues([
            IntegrityIssue::RawVideoCodec,
            IntegrityIssue::MissingAudioStream,
        ]);
        assert!(!bad.is_good);
        assert_eq!(bad.describe(), "missing audio stream, raw video codec");
    }

    #[test]
    fn test_known_totals() {
        let mut meta = MediaMetadata {
            streams: vec![video("h264")],
            ..Default::default()
        };
        assert_eq!(meta.known_duration_secs(), Some(50.0));
        assert_eq!(meta.known_frame_count(), Some(1200));

        meta.duration_secs = Some(0.0);
        meta.streams[0].duration_secs = None;
        meta.streams[0].nb_frames = Some(0);
        assert_eq!(meta.known_duration_secs(), None);
        assert_eq!(meta.known_frame_count(), None);
    }

    #[test]
    fn test_settings_extension_and_muxer() {
        let settings = ConvertSettings {
            container: "MKV".into(),
            ..Default::default()
        };
        assert_eq!(settings.target_extension().as_deref(), Some("mkv"));
        assert_eq!(settings.muxer(), Some("matroska"));

        let copy = ConvertSettings {
            container: "copy".into(),
            ..Default::default()
        };
        assert!(copy.keeps_container());
        assert_eq!(copy.target_extension(), None);
        assert_eq!(copy.muxer(), None);
    }

    #[test]
    fn test_issue_serialization() {
        let json = serde_json::to_string(&IntegrityIssue::MissingContainerInfo).unwrap();
        assert_eq!(json, "\"missing_container_info\"");
    }
}
