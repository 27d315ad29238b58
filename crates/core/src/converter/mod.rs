//! Converter module: probing, integrity checks and transcoding.
//!
//! The [`VideoConverter`] trait wraps an external tool. [`FfmpegConverter`]
//! drives ffprobe/ffmpeg through the [`CommandRunner`](crate::process::CommandRunner);
//! `testing::MockConverter` stands in for it in tests.
//!
//! # Example
//!
//! ```ignore
//! use transcodr_core::converter::{FfmpegConverter, VideoConverter};
//!
//! let converter = FfmpegConverter::with_defaults();
//! converter.validate().await?;
//!
//! let outcome = converter.check_integrity(Path::new("/videos/a.avi")).await;
//! if outcome.success && outcome.verdict.is_good {
//!     println!("ok");
//! }
//! ```

mod config;
mod error;
mod ffmpeg;
pub mod integrity;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::VideoConverter;
pub use types::{
    ConvertOutcome, ConvertRequest, ConvertSettings, IntegrityIssue, IntegrityOutcome,
    IntegrityVerdict, MediaMetadata, ProbeOutcome, StreamInfo, COPY_CONTAINER,
};
