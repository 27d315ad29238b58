use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use super::OutputSink;

/// Writes run output to stdout.
pub struct ConsoleSink {
    progressive: bool,
    /// A progress line is on screen without its newline.
    mid_line: AtomicBool,
    closed: AtomicBool,
}

impl ConsoleSink {
    /// Progressive updates are enabled iff stdout is a terminal.
    pub fn new() -> Self {
        Self::with_progressive(std::io::stdout().is_terminal())
    }

    pub fn with_progressive(progressive: bool) -> Self {
        Self {
            progressive,
            mid_line: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn emit(&self, text: &str, newline: bool) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut out = std::io::stdout().lock();
        let result = if newline {
            if self.mid_line.swap(false, Ordering::SeqCst) {
                let _ = out.write_all(b"\n");
            }
            writeln!(out, "{}", text)
        } else {
            self.mid_line.store(true, Ordering::SeqCst);
            out.write_all(text.as_bytes()).and_then(|_| out.flush())
        };
        if let Err(e) = result {
            warn!("Failed to write to stdout: {}", e);
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn write(&self, text: &str) {
        self.emit(text, false);
    }

    fn write_line(&self, line: &str) {
        self.emit(line, true);
    }

    fn supports_progressive_updates(&self) -> bool {
        self.progressive
    }

    fn flush(&self) {
        if let Err(e) = std::io::stdout().lock().flush() {
            warn!("Failed to flush stdout: {}", e);
        }
    }

    fn shutdown(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.mid_line.swap(false, Ordering::SeqCst) {
            let _ = std::io::stdout().lock().write_all(b"\n");
        }
        self.flush();
        self.closed.store(true, Ordering::SeqCst);
    }
}
