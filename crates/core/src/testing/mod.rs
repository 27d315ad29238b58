//! Testing utilities and mock implementations.
//!
//! Lets the full runner be exercised without ffmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use transcodr_core::testing::{MemorySink, MockConverter};
//!
//! let converter = Arc::new(MockConverter::new());
//! let sink = Arc::new(MemorySink::new());
//!
//! // Configure canned verdicts
//! converter.set_verdict(&source, fixtures::bad_verdict()).await;
//! ```

mod memory_sink;
mod mock_converter;

pub use memory_sink::MemorySink;
pub use mock_converter::{MockConverter, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::converter::{IntegrityIssue, IntegrityVerdict, MediaMetadata};
    use crate::testing::MockConverter;

    /// Metadata of a healthy file whose video stream uses `codec`.
    pub fn metadata_with_video_codec(path: &Path, codec: &str) -> MediaMetadata {
        let mut metadata = MockConverter::healthy_metadata(path);
        if let Some(stream) = metadata.streams.iter_mut().find(|s| s.is_video()) {
            stream.codec_name = Some(codec.to_string());
        }
        metadata
    }

    /// Metadata of a file with an audio stream only.
    pub fn audio_only_metadata(path: &Path) -> MediaMetadata {
        let mut metadata = MockConverter::healthy_metadata(path);
        metadata.streams.retain(|s| !s.is_video());
        metadata
    }

    /// A verdict that fails on missing streams.
    pub fn bad_verdict() -> IntegrityVerdict {
        IntegrityVerdict::from_issues([
            IntegrityIssue::MissingVideoStream,
            IntegrityIssue::MissingAudioStream,
        ])
    }

    /// Writes `size` bytes at `path`, creating parent directories.
    pub async fn write_media_file(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .expect("create fixture dir");
        }
        tokio::fs::write(path, vec![b'v'; size])
            .await
            .expect("write fixture file");
    }
}
