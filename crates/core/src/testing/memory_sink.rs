//! In-memory output sink for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::output::OutputSink;

/// Captures everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<String>,
    progressive: bool,
    closed: AtomicBool,
    shutdown_calls: AtomicUsize,
}

impl MemorySink {
    /// A non-progressive sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that reports support for progressive updates.
    pub fn progressive() -> Self {
        Self {
            progressive: true,
            ..Self::default()
        }
    }

    fn buffer(&self) -> MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buffer().clone()
    }

    /// Written text split on newlines, empty lines dropped.
    pub fn lines(&self) -> Vec<String> {
        self.buffer()
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.buffer().contains(needle)
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times `shutdown` was called, including ignored repeats.
    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

impl OutputSink for MemorySink {
    fn write(&self, text: &str) {
        if !self.is_shut_down() {
            self.buffer().push_str(text);
        }
    }

    fn write_line(&self, line: &str) {
        if !self.is_shut_down() {
            let mut buffer = self.buffer();
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    fn supports_progressive_updates(&self) -> bool {
        self.progressive
    }

    fn flush(&self) {}

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}
