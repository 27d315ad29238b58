//! Transcode progress rendering.
//!
//! One strategy is chosen per transcode from what the sink supports and
//! what the source metadata tells us about its length.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Width of the bar including the `>` head.
const BAR_WIDTH: usize = 21;

/// Messages between two markers of the naive strategy.
pub const NAIVE_MARKER_INTERVAL: u64 = 25;

static FRAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").expect("valid regex"));

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid regex")
});

/// Turns tool output lines into progress text for the sink.
pub trait ProgressStrategy: Send {
    /// Returns text to write, or `None` to skip this line.
    fn on_progress_message(&mut self, line: &str) -> Option<String>;
}

/// Picks the strategy for one transcode.
pub fn select_strategy(
    progressive: bool,
    total_duration_secs: Option<f64>,
    total_frames: Option<u64>,
) -> Box<dyn ProgressStrategy> {
    if !progressive {
        return Box::new(NoProgress);
    }
    if let Some(total) = total_duration_secs.filter(|d| *d > 0.0) {
        return Box::new(DurationProgress::new(total));
    }
    if let Some(total) = total_frames.filter(|n| *n > 0) {
        return Box::new(FrameProgress::new(total));
    }
    Box::new(NaiveProgress::new(NAIVE_MARKER_INTERVAL))
}

/// Renders `\r` + `=` per 5% + `>`, padded to the bar width, then ` %<n>`.
pub fn render_bar(percent: u32) -> String {
    let percent = percent.min(100);
    let mut bar = "=".repeat((percent / 5) as usize);
    bar.push('>');
    format!("\r{:<width$} %{}", bar, percent, width = BAR_WIDTH)
}

/// Elapsed seconds from an ffmpeg `time=hh:mm:ss[.frac]` token.
pub fn parse_elapsed_secs(line: &str) -> Option<f64> {
    let caps = TIME_RE.captures(line)?;
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Frame number from an ffmpeg `frame=<n>` token.
pub fn parse_frame(line: &str) -> Option<u64> {
    FRAME_RE.captures(line)?.get(1)?.as_str().parse().ok()
}

fn percent_of(done: f64, total: f64) -> u32 {
    ((done / total) * 100.0).clamp(0.0, 100.0) as u32
}

/// Percentage from elapsed media time over total duration.
pub struct DurationProgress {
    total_secs: f64,
    last: Option<u32>,
}

impl DurationProgress {
    pub fn new(total_secs: f64) -> Self {
        Self {
            total_secs,
            last: None,
        }
    }
}

impl ProgressStrategy for DurationProgress {
    fn on_progress_message(&mut self, line: &str) -> Option<String> {
        let percent = percent_of(parse_elapsed_secs(line)?, self.total_secs);
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(render_bar(percent))
    }
}

/// Percentage from the current frame over the total frame count.
pub struct FrameProgress {
    total_frames: u64,
    last: Option<u32>,
}

impl FrameProgress {
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            last: None,
        }
    }
}

impl ProgressStrategy for FrameProgress {
    fn on_progress_message(&mut self, line: &str) -> Option<String> {
        let frame = parse_frame(line)?;
        let percent = percent_of(frame as f64, self.total_frames as f64);
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(render_bar(percent))
    }
}

/// A marker every `every` messages when no total is known.
pub struct NaiveProgress {
    every: u64,
    seen: u64,
}

impl NaiveProgress {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }
}

impl ProgressStrategy for NaiveProgress {
    fn on_progress_message(&mut self, _line: &str) -> Option<String> {
        self.seen += 1;
        if self.seen % self.every == 0 {
            Some(".".to_string())
        } else {
            None
        }
    }
}

/// Renders nothing.
pub struct NoProgress;

impl ProgressStrategy for NoProgress {
    fn on_progress_message(&mut self, _line: &str) -> Option<String> {
        None
    }
}
