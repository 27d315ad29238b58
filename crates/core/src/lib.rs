pub mod config;
pub mod converter;
pub mod factory;
pub mod fs;
pub mod job;
pub mod ledger;
pub mod output;
pub mod process;
pub mod runner;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config,
    ConfigError, LedgerConfig, RunSettings, TargetLayout,
};
pub use converter::{
    ConvertSettings, ConverterConfig, ConverterError, FfmpegConverter, IntegrityVerdict,
    VideoConverter,
};
pub use factory::{FactoryError, JobFactory};
pub use job::{FailureReason, Job, JobError, JobOptions, JobResult, JobState, JobTask, TaskKind};
pub use ledger::{JobLedger, Ledger, LedgerError, LedgerStats};
pub use output::{ConsoleSink, OutputSink};
pub use runner::{plan_run, BatchRunner, RunSummary, RunnerError, RunnerHandle};
