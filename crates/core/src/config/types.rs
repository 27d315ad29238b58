use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::converter::{ConvertSettings, ConverterConfig};
use crate::job::TaskKind;

/// File name of the ledger when none is configured.
pub const DEFAULT_LEDGER_FILE: &str = ".transcodr-ledger.json";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub run: RunSettings,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Ledger file. Defaults to a hidden file in the source root.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Seconds between periodic flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    /// Human-readable run name stored in the ledger.
    #[serde(default)]
    pub name: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            flush_interval_secs: default_flush_interval(),
            name: None,
        }
    }
}

impl LedgerConfig {
    /// Configured ledger path, or the default one under `source_root`.
    pub fn resolve_path(&self, source_root: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| source_root.join(DEFAULT_LEDGER_FILE))
    }
}

fn default_flush_interval() -> u64 {
    10
}

/// Where target files are placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLayout {
    /// Next to the source.
    #[default]
    SaveInPlace,
    /// Under the target root, mirroring the source's relative directory.
    MirrorRelative,
    /// Directly in the target root.
    Flat,
}

impl TargetLayout {
    pub fn needs_target_root(&self) -> bool {
        !matches!(self, Self::SaveInPlace)
    }
}

impl fmt::Display for TargetLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SaveInPlace => "save_in_place",
            Self::MirrorRelative => "mirror_relative",
            Self::Flat => "flat",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TargetLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "save_in_place" | "in_place" => Ok(Self::SaveInPlace),
            "mirror_relative" | "mirror" => Ok(Self::MirrorRelative),
            "flat" => Ok(Self::Flat),
            other => Err(format!("unknown layout: {}", other)),
        }
    }
}

/// Settings of one batch run. Persisted in the ledger and authoritative
/// when a run is resumed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunSettings {
    #[serde(default)]
    pub source_root: PathBuf,
    #[serde(default)]
    pub target_root: Option<PathBuf>,
    #[serde(default)]
    pub layout: TargetLayout,
    #[serde(default = "default_task")]
    pub task: TaskKind,
    /// Extra directory levels to descend; 0 lists the source root only.
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,
    /// Extension allow-list, case-insensitive. Empty accepts every file.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub convert: ConvertSettings,
    #[serde(default)]
    pub allow_clobber_existing: bool,
    #[serde(default)]
    pub skip_convert_existing: bool,
    #[serde(default)]
    pub delete_source_after_convert: bool,
    #[serde(default)]
    pub keep_invalid_convert_result: bool,
    #[serde(default)]
    pub skip_video_codec_names: Vec<String>,
}

fn default_task() -> TaskKind {
    TaskKind::Convert
}

fn default_max_depth() -> i32 {
    16
}

fn default_extensions() -> Vec<String> {
    ["mkv", "mp4", "m4v", "avi", "mov", "wmv", "webm", "ts", "m2ts", "mpg", "mpeg", "flv"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            source_root: PathBuf::new(),
            target_root: None,
            layout: TargetLayout::default(),
            task: default_task(),
            max_depth: default_max_depth(),
            extensions: default_extensions(),
            convert: ConvertSettings::default(),
            allow_clobber_existing: false,
            skip_convert_existing: false,
            delete_source_after_convert: false,
            keep_invalid_convert_result: false,
            skip_video_codec_names: Vec::new(),
        }
    }
}

impl RunSettings {
    /// Target root, falling back to the source root.
    pub fn target_root(&self) -> &Path {
        self.target_root.as_deref().unwrap_or(&self.source_root)
    }
}
