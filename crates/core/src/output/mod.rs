//! Output sinks for status lines and progress bars.
//!
//! Logs go through `tracing` to stderr; the sink carries the human-facing
//! run output (per-job status, progress, summary) to stdout.

mod console;

pub use console::ConsoleSink;

/// Destination for run output.
pub trait OutputSink: Send + Sync {
    /// Writes text without a trailing newline.
    fn write(&self, text: &str);

    /// Writes one line.
    fn write_line(&self, line: &str);

    /// Whether carriage-return progress lines can overwrite each other.
    fn supports_progressive_updates(&self) -> bool;

    fn flush(&self);

    /// Flushes and closes the sink. Later calls and writes are ignored.
    fn shutdown(&self);
}
