//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConverterError;
use super::integrity;
use super::types::{ConvertOutcome, ConvertRequest, IntegrityOutcome, ProbeOutcome};
use crate::process::CommandEventSender;

/// Probes, checks and transcodes video files via an external tool.
///
/// Per-file operations never return `Err`: failures are reported through
/// the `success` flag of the outcome.
#[async_trait]
pub trait VideoConverter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Reads container and stream metadata of a file.
    async fn probe(&self, path: &Path) -> ProbeOutcome;

    /// Probes a file and evaluates the integrity rules against it.
    async fn check_integrity(&self, path: &Path) -> IntegrityOutcome {
        integrity::check_file(self, path).await
    }

    /// Transcodes `request.source` into `request.target`.
    ///
    /// Lifecycle events of the underlying process go to `events`; the sender
    /// is dropped when the transcode returns.
    async fn convert(
        &self,
        request: ConvertRequest,
        events: Option<CommandEventSender>,
    ) -> ConvertOutcome;

    /// Validates that the converter is properly configured and ready.
    async fn validate(&self) -> Result<(), ConverterError>;
}
