//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::converter::integrity;
use crate::converter::{
    ConvertOutcome, ConvertRequest, ConverterError, IntegrityOutcome, IntegrityVerdict,
    MediaMetadata, ProbeOutcome, StreamInfo, VideoConverter,
};
use crate::process::{CommandEvent, CommandEventSender, OutputStream};

/// A recorded transcode for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The request that was submitted.
    pub request: ConvertRequest,
    /// Whether the transcode succeeded.
    pub success: bool,
}

/// Mock implementation of the [`VideoConverter`] trait.
///
/// Never spawns a process. Provides controllable behavior for testing:
/// - Canned metadata and integrity verdicts per path
/// - Injected probe, integrity-check and transcode failures
/// - Synthetic ffmpeg progress lines on the event channel
/// - Real target files written on transcode
///
/// # Example
///
/// ```rust,ignore
/// use transcodr_core::testing::MockConverter;
///
/// let converter = MockConverter::new();
/// converter.set_verdict("/videos/b.mkv", bad_verdict).await;
///
/// let outcome = converter.check_integrity(Path::new("/videos/b.mkv")).await;
/// assert!(!outcome.verdict.is_good);
/// ```
#[derive(Debug)]
pub struct MockConverter {
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    integrity_checks: Arc<RwLock<Vec<PathBuf>>>,
    /// Pre-configured probe results by path.
    metadata: Arc<RwLock<HashMap<PathBuf, MediaMetadata>>>,
    /// Pre-configured verdicts by path.
    verdicts: Arc<RwLock<HashMap<PathBuf, IntegrityVerdict>>>,
    probe_failures: Arc<RwLock<HashSet<PathBuf>>>,
    check_failures: Arc<RwLock<HashSet<PathBuf>>>,
    /// Sources whose transcode fails.
    convert_failures: Arc<RwLock<HashSet<PathBuf>>>,
    /// If set, the next transcode fails with this message.
    next_convert_error: Arc<RwLock<Option<String>>>,
    /// Metadata returned for paths without a canned entry.
    default_metadata: Arc<RwLock<Option<MediaMetadata>>>,
    /// Bytes written to each successful target.
    output_bytes: Arc<RwLock<usize>>,
    progress_lines: Arc<RwLock<Vec<String>>>,
    conversion_delay: Arc<RwLock<Duration>>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            integrity_checks: Arc::new(RwLock::new(Vec::new())),
            metadata: Arc::new(RwLock::new(HashMap::new())),
            verdicts: Arc::new(RwLock::new(HashMap::new())),
            probe_failures: Arc::new(RwLock::new(HashSet::new())),
            check_failures: Arc::new(RwLock::new(HashSet::new())),
            convert_failures: Arc::new(RwLock::new(HashSet::new())),
            next_convert_error: Arc::new(RwLock::new(None)),
            default_metadata: Arc::new(RwLock::new(None)),
            output_bytes: Arc::new(RwLock::new(512)),
            progress_lines: Arc::new(RwLock::new(Self::default_progress_lines())),
            conversion_delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Metadata of a healthy h264/aac Matroska file: 60 s, 1440 frames.
    pub fn healthy_metadata(path: &Path) -> MediaMetadata {
        MediaMetadata {
            path: path.to_path_buf(),
            format_name: Some("matroska".to_string()),
            duration_secs: Some(60.0),
            size_bytes: None,
            bit_rate: Some(2_000_000),
            streams: vec![
                StreamInfo {
                    index: 0,
                    codec_type: "video".to_string(),
                    codec_name: Some("h264".to_string()),
                    nb_frames: Some(1440),
                    duration_secs: Some(60.0),
                    width: Some(1920),
                    height: Some(1080),
                },
                StreamInfo {
                    index: 1,
                    codec_type: "audio".to_string(),
                    codec_name: Some("aac".to_string()),
                    nb_frames: None,
                    duration_secs: Some(60.0),
                    width: None,
                    height: None,
                },
            ],
        }
    }

    fn default_progress_lines() -> Vec<String> {
        vec![
            "frame=360".to_string(),
            "out_time=00:00:15.000000".to_string(),
            "frame=720".to_string(),
            "out_time=00:00:30.000000".to_string(),
            "frame=1440".to_string(),
            "out_time=00:01:00.000000".to_string(),
            "progress=end".to_string(),
        ]
    }

    /// Get all recorded transcodes.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of transcodes attempted.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Paths passed to `check_integrity`, in call order.
    pub async fn integrity_checks(&self) -> Vec<PathBuf> {
        self.integrity_checks.read().await.clone()
    }

    /// Set the probe result for a specific path.
    pub async fn set_metadata(&self, path: impl AsRef<Path>, metadata: MediaMetadata) {
        self.metadata
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), metadata);
    }

    /// Set the metadata returned for paths without a canned entry.
    pub async fn set_default_metadata(&self, metadata: MediaMetadata) {
        *self.default_metadata.write().await = Some(metadata);
    }

    /// Set the integrity verdict for a specific path.
    pub async fn set_verdict(&self, path: impl AsRef<Path>, verdict: IntegrityVerdict) {
        self.verdicts
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), verdict);
    }

    /// Make probes of `path` fail.
    pub async fn fail_probe(&self, path: impl AsRef<Path>) {
        self.probe_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Make integrity checks of `path` fail to run.
    pub async fn fail_integrity_check(&self, path: impl AsRef<Path>) {
        self.check_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf());
    }

    /// Make every transcode of `source` fail.
    pub async fn fail_convert_for(&self, source: impl AsRef<Path>) {
        self.convert_failures
            .write()
            .await
            .insert(source.as_ref().to_path_buf());
    }

    /// Make the next transcode fail with `message`.
    pub async fn set_next_convert_error(&self, message: impl Into<String>) {
        *self.next_convert_error.write().await = Some(message.into());
    }

    /// Set the size of files written by successful transcodes.
    pub async fn set_output_bytes(&self, bytes: usize) {
        *self.output_bytes.write().await = bytes;
    }

    /// Replace the synthetic stderr lines emitted during a transcode.
    pub async fn set_progress_lines(&self, lines: Vec<String>) {
        *self.progress_lines.write().await = lines;
    }

    /// Set the simulated transcode duration.
    pub async fn set_conversion_delay(&self, delay: Duration) {
        *self.conversion_delay.write().await = delay;
    }

    async fn take_convert_error(&self, source: &Path) -> Option<String> {
        if let Some(message) = self.next_convert_error.write().await.take() {
            return Some(message);
        }
        if self.convert_failures.read().await.contains(source) {
            return Some("mock transcode failure".to_string());
        }
        None
    }
}

fn send(events: &Option<CommandEventSender>, event: CommandEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[async_trait]
impl VideoConverter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> ProbeOutcome {
        if self.probe_failures.read().await.contains(path) {
            return ProbeOutcome::failed(format!("mock probe failure: {}", path.display()));
        }

        if let Some(metadata) = self.metadata.read().await.get(path) {
            return ProbeOutcome::ok(metadata.clone());
        }

        let mut metadata = match self.default_metadata.read().await.as_ref() {
            Some(metadata) => metadata.clone(),
            None => Self::healthy_metadata(path),
        };
        metadata.path = path.to_path_buf();
        if let Ok(meta) = tokio::fs::metadata(path).await {
            metadata.size_bytes = Some(meta.len());
        }
        ProbeOutcome::ok(metadata)
    }

    async fn check_integrity(&self, path: &Path) -> IntegrityOutcome {
        self.integrity_checks.write().await.push(path.to_path_buf());

        if self.check_failures.read().await.contains(path) {
            return IntegrityOutcome::failed(format!(
                "mock integrity check failure: {}",
                path.display()
            ));
        }

        let canned = self.verdicts.read().await.get(path).cloned();
        match canned {
            Some(verdict) => {
                let metadata = self.probe(path).await.metadata;
                IntegrityOutcome::checked(verdict, metadata)
            }
            None => integrity::check_file(self, path).await,
        }
    }

    async fn convert(
        &self,
        request: ConvertRequest,
        events: Option<CommandEventSender>,
    ) -> ConvertOutcome {
        let start = Instant::now();
        let command_id = request.command_id.clone();

        send(
            &events,
            CommandEvent::Started {
                command_id: command_id.clone(),
                command_line: format!(
                    "mock-ffmpeg -i {} {}",
                    request.source.display(),
                    request.target.display()
                ),
            },
        );
        send(
            &events,
            CommandEvent::Running {
                command_id: command_id.clone(),
                pid: None,
            },
        );

        let lines = self.progress_lines.read().await.clone();
        for line in lines {
            send(
                &events,
                CommandEvent::MessageReceived {
                    command_id: command_id.clone(),
                    stream: OutputStream::Stderr,
                    line,
                },
            );
        }

        let delay = *self.conversion_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let error = match self.take_convert_error(&request.source).await {
            Some(message) => {
                // Leave a partial file behind, as an interrupted ffmpeg would.
                let _ = tokio::fs::write(&request.target, b"partial").await;
                Some(message)
            }
            None => {
                let bytes = *self.output_bytes.read().await;
                tokio::fs::write(&request.target, vec![b'x'; bytes])
                    .await
                    .err()
                    .map(|e| format!("mock write failed: {}", e))
            }
        };

        let success = error.is_none();
        send(
            &events,
            CommandEvent::Finished {
                command_id: command_id.clone(),
                exit_code: Some(if success { 0 } else { 1 }),
                success,
            },
        );

        self.conversions.write().await.push(RecordedConversion {
            request,
            success,
        });

        ConvertOutcome {
            success,
            elapsed_ms: start.elapsed().as_millis() as u64,
            command_id,
            error,
        }
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}
