use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use transcodr_core::{RunSettings, TargetLayout, TaskKind};

#[derive(Parser)]
#[command(name = "transcodr")]
#[command(author, version, about = "Resumable batch video transcoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run (or resume) a batch over a directory tree
    Run(RunArgs),

    /// Print the stats and failed jobs of a ledger
    Status {
        /// Ledger file
        #[arg(long)]
        ledger: PathBuf,

        /// Print the whole ledger as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the integrity of one media file
    Check {
        #[arg(required = true)]
        file: PathBuf,
    },
}

#[derive(Args, Default)]
pub struct RunArgs {
    /// Directory to process
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Target root for mirror and flat layouts
    #[arg(long)]
    pub target: Option<PathBuf>,

    /// Ledger file (defaults to a hidden file in the source directory)
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Run name stored in a new ledger
    #[arg(long)]
    pub name: Option<String>,

    /// save_in_place, mirror_relative or flat
    #[arg(long)]
    pub layout: Option<TargetLayout>,

    /// convert, probe, integrity_check or copy
    #[arg(long)]
    pub task: Option<TaskKind>,

    /// Target container, or "copy" to keep the source's
    #[arg(long)]
    pub container: Option<String>,

    #[arg(long)]
    pub video_codec: Option<String>,

    #[arg(long)]
    pub audio_codec: Option<String>,

    #[arg(long)]
    pub hwaccel: Option<String>,

    /// Delete existing targets before writing
    #[arg(long)]
    pub clobber: bool,

    /// Skip sources whose target already exists
    #[arg(long)]
    pub skip_existing: bool,

    /// Delete each source after a verified conversion
    #[arg(long)]
    pub delete_source: bool,

    /// Keep targets that fail the integrity check
    #[arg(long)]
    pub keep_invalid: bool,

    /// Skip sources whose video codec has this name (repeatable)
    #[arg(long = "skip-codec")]
    pub skip_codecs: Vec<String>,

    /// Directory levels below the source to descend
    #[arg(long)]
    pub max_depth: Option<i32>,
}

impl RunArgs {
    /// Applies flags given on the command line over `settings`.
    pub fn apply(&self, settings: &mut RunSettings) {
        if let Some(source) = &self.source {
            settings.source_root = source.clone();
        }
        if let Some(target) = &self.target {
            settings.target_root = Some(target.clone());
        }
        if let Some(layout) = self.layout {
            settings.layout = layout;
        }
        if let Some(task) = self.task {
            settings.task = task;
        }
        if let Some(container) = &self.container {
            settings.convert.container = container.clone();
        }
        if self.video_codec.is_some() {
            settings.convert.video_codec = self.video_codec.clone();
        }
        if self.audio_codec.is_some() {
            settings.convert.audio_codec = self.audio_codec.clone();
        }
        if self.hwaccel.is_some() {
            settings.convert.hwaccel = self.hwaccel.clone();
        }
        if let Some(depth) = self.max_depth {
            settings.max_depth = depth;
        }
        settings.allow_clobber_existing |= self.clobber;
        settings.skip_convert_existing |= self.skip_existing;
        settings.delete_source_after_convert |= self.delete_source;
        settings.keep_invalid_convert_result |= self.keep_invalid;
        if !self.skip_codecs.is_empty() {
            settings.skip_video_codec_names = self.skip_codecs.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "transcodr",
            "-v",
            "run",
            "--source",
            "/videos",
            "--layout",
            "mirror",
            "--container",
            "mp4",
            "--skip-codec",
            "hevc",
            "--skip-codec",
            "av1",
            "--delete-source",
        ]);
        assert!(cli.verbose);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        let mut settings = RunSettings::default();
        args.apply(&mut settings);
        assert_eq!(settings.source_root, PathBuf::from("/videos"));
        assert_eq!(settings.layout, TargetLayout::MirrorRelative);
        assert_eq!(settings.convert.container, "mp4");
        assert_eq!(settings.skip_video_codec_names, vec!["hevc", "av1"]);
        assert!(settings.delete_source_after_convert);
        assert!(!settings.allow_clobber_existing);
    }

    #[test]
    fn test_flags_do_not_clear_config() {
        let mut settings = RunSettings {
            allow_clobber_existing: true,
            max_depth: 2,
            ..Default::default()
        };
        RunArgs::default().apply(&mut settings);
        assert!(settings.allow_clobber_existing);
        assert_eq!(settings.max_depth, 2);
    }
}
