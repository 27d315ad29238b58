//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::VideoConverter;
use super::types::{ConvertOutcome, ConvertRequest, MediaMetadata, ProbeOutcome, StreamInfo};
use crate::process::{CommandEventSender, CommandRequest, CommandRunner};

/// Number of stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
    runner: CommandRunner,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            config,
            runner: CommandRunner::new(),
        }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn build_probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }

    /// Builds ffmpeg arguments for a transcode.
    ///
    /// Progress goes to stderr as newline-terminated `key=value` pairs so
    /// it can be read line by line.
    fn build_convert_args(&self, request: &ConvertRequest) -> Vec<String> {
        let settings = &request.settings;
        let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];

        if let Some(ref hwaccel) = settings.hwaccel {
            args.extend(["-hwaccel".to_string(), hwaccel.clone()]);
        }

        args.extend([
            "-i".to_string(),
            request.source.to_string_lossy().to_string(),
        ]);

        if let Some(ref codec) = settings.video_codec {
            args.extend(["-c:v".to_string(), codec.clone()]);
        }
        if let Some(ref codec) = settings.audio_codec {
            args.extend(["-c:a".to_string(), codec.clone()]);
        }
        if let Some(muxer) = settings.muxer() {
            args.extend(["-f".to_string(), muxer.to_string()]);
        }

        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.extend(settings.extra_args.iter().cloned());

        args.push(request.target.to_string_lossy().to_string());
        args
    }

    /// Parses ffprobe JSON output into metadata.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaMetadata, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: Option<String>,
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            index: Option<u32>,
            codec_type: Option<String>,
            codec_name: Option<String>,
            nb_frames: Option<String>,
            duration: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            ConverterError::parse_error(format!("Failed to parse ffprobe output: {}", e))
        })?;

        let (format_name, duration_secs, size_bytes, bit_rate) = match probe.format {
            Some(format) => (
                format
                    .format_name
                    .as_deref()
                    .and_then(|f| f.split(',').next())
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
                format.duration.as_deref().and_then(|d| d.parse::<f64>().ok()),
                format.size.as_deref().and_then(|s| s.parse::<u64>().ok()),
                format.bit_rate.as_deref().and_then(|b| b.parse::<u64>().ok()),
            ),
            None => (None, None, None, None),
        };

        let streams = probe
            .streams
            .into_iter()
            .enumerate()
            .map(|(i, s)| StreamInfo {
                index: s.index.unwrap_or(i as u32),
                codec_type: s.codec_type.unwrap_or_default(),
                codec_name: s.codec_name,
                nb_frames: s.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()),
                duration_secs: s.duration.as_deref().and_then(|d| d.parse::<f64>().ok()),
                width: s.width,
                height: s.height,
            })
            .collect();

        Ok(MediaMetadata {
            path: path.to_path_buf(),
            format_name,
            duration_secs,
            size_bytes,
            bit_rate,
            streams,
        })
    }

    async fn check_tool(&self, path: &Path, not_found: ConverterError) -> Result<(), ConverterError> {
        let request = CommandRequest::new(path, vec!["-version".to_string()])
            .with_timeout_ms(self.config.probe_timeout_ms());
        let result = self.runner.run(request, None).await;

        if result.success {
            return Ok(());
        }
        if result.exit_code.is_none() && !result.timed_out {
            return Err(not_found);
        }
        Err(ConverterError::tool_failed(
            path.display().to_string(),
            result.failure_summary(),
        ))
    }
}

#[async_trait]
impl VideoConverter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> ProbeOutcome {
        let request =
            CommandRequest::new(&self.config.ffprobe_path, Self::build_probe_args(path))
                .with_timeout_ms(self.config.probe_timeout_ms());
        let result = self.runner.run(request, None).await;

        if !result.success {
            let mut error = format!("ffprobe {}", result.failure_summary());
            let tail = result.stderr_tail(STDERR_TAIL_LINES);
            if !tail.is_empty() {
                error.push_str(": ");
                error.push_str(&tail);
            }
            debug!("Probe of {} failed: {}", path.display(), error);
            return ProbeOutcome::failed(error);
        }

        match Self::parse_probe_output(path, &result.stdout_text()) {
            Ok(metadata) => ProbeOutcome::ok(metadata),
            Err(e) => {
                debug!("Probe of {} unparseable: {}", path.display(), e);
                ProbeOutcome::failed(e.to_string())
            }
        }
    }

    async fn convert(
        &self,
        request: ConvertRequest,
        events: Option<CommandEventSender>,
    ) -> ConvertOutcome {
        let args = self.build_convert_args(&request);
        let command = CommandRequest::new(&self.config.ffmpeg_path, args)
            .with_command_id(request.command_id.clone())
            .with_timeout_ms(self.config.timeout_ms());

        let result = self.runner.run(command, events.as_ref()).await;

        let error = if result.success {
            None
        } else {
            let mut error = format!("ffmpeg {}", result.failure_summary());
            let tail = result.stderr_tail(STDERR_TAIL_LINES);
            if !tail.is_empty() {
                error.push_str(": ");
                error.push_str(&tail);
            }
            warn!(
                "Transcode of {} failed: {}",
                request.source.display(),
                error
            );
            Some(error)
        };

        ConvertOutcome {
            success: result.success,
            elapsed_ms: result.elapsed_ms,
            command_id: result.command_id,
            error,
        }
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        self.check_tool(
            &self.config.ffmpeg_path,
            ConverterError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            },
        )
        .await?;
        self.check_tool(
            &self.config.ffprobe_path,
            ConverterError::FfprobeNotFound {
                path: self.config.ffprobe_path.clone(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::types::ConvertSettings;
    use crate::process::CommandId;
    use std::path::PathBuf;

    fn request(settings: ConvertSettings) -> ConvertRequest {
        ConvertRequest {
            source: PathBuf::from("/in/My Movie.avi"),
            target: PathBuf::from("/out/My Movie.mkv"),
            settings,
            command_id: CommandId::from("convert-1"),
        }
    }

    #[test]
    fn test_build_convert_args() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_convert_args(&request(ConvertSettings {
            container: "mkv".into(),
            video_codec: Some("libx265".into()),
            audio_codec: Some("aac".into()),
            hwaccel: Some("cuda".into()),
            extra_args: vec!["-crf".into(), "22".into()],
        }));

        let pos = |s: &str| args.iter().position(|a| a == s).unwrap();
        assert!(pos("-hwaccel") < pos("-i"));
        assert_eq!(args[pos("-hwaccel") + 1], "cuda");
        assert_eq!(args[pos("-i") + 1], "/in/My Movie.avi");
        assert_eq!(args[pos("-c:v") + 1], "libx265");
        assert_eq!(args[pos("-c:a") + 1], "aac");
        assert_eq!(args[pos("-f") + 1], "matroska");
        assert_eq!(args[pos("-progress") + 1], "pipe:2");
        assert_eq!(args[pos("-crf") + 1], "22");
        assert!(args.contains(&"-y".to_string()));
        assert_eq!(args.last().unwrap(), "/out/My Movie.mkv");
    }

    #[test]
    fn test_build_convert_args_copy_container() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_convert_args(&request(ConvertSettings {
            container: "copy".into(),
            ..Default::default()
        }));

        assert!(!args.contains(&"-f".to_string()));
        assert!(!args.contains(&"-hwaccel".to_string()));
        assert!(!args.contains(&"-c:v".to_string()));
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "test.mkv",
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "size": "5000000000",
                "bit_rate": "5555555"
            },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "nb_frames": "172627"
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": "aac"
                }
            ]
        }"#;

        let meta = FfmpegConverter::parse_probe_output(Path::new("test.mkv"), json).unwrap();
        assert_eq!(meta.format_name.as_deref(), Some("matroska"));
        assert_eq!(meta.size_bytes, Some(5_000_000_000));
        assert_eq!(meta.known_duration_secs(), Some(7200.0));
        assert_eq!(meta.known_frame_count(), Some(172_627));
        let video = meta.primary_video_stream().unwrap();
        assert_eq!(video.codec_name.as_deref(), Some("h264"));
        assert_eq!(video.width, Some(1920));
        assert_eq!(
            meta.primary_audio_stream().unwrap().codec_name.as_deref(),
            Some("aac")
        );
    }

    #[test]
    fn test_parse_probe_output_without_format() {
        let meta =
            FfmpegConverter::parse_probe_output(Path::new("x.bin"), r#"{"streams": []}"#).unwrap();
        assert!(!meta.has_container_info());
        assert!(meta.streams.is_empty());
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        let err = FfmpegConverter::parse_probe_output(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, ConverterError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_probe_with_missing_binary_fails() {
        let converter = FfmpegConverter::new(ConverterConfig::with_paths(
            PathBuf::from("/nonexistent/ffmpeg"),
            PathBuf::from("/nonexistent/ffprobe"),
        ));
        let outcome = converter.probe(Path::new("/tmp/whatever.mkv")).await;
        assert!(!outcome.success);
        assert!(outcome.metadata.is_none());

        let err = converter.validate().await.unwrap_err();
        assert!(matches!(err, ConverterError::FfmpegNotFound { .. }));
    }
}
