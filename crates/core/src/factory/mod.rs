//! Builds job options from run settings and jobs from options.

mod paths;

pub use paths::{
    add_temp_token, has_temp_token, resolve_target, strip_temp_token, target_name, target_parent,
    TEMP_TOKEN,
};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::RunSettings;
use crate::converter::VideoConverter;
use crate::fs::FileDescriptor;
use crate::job::{ConvertOptions, CopyOptions, Job, JobOptions, JobTask, TaskKind};
use crate::output::OutputSink;

/// Configuration errors found while building jobs. Raised before any job
/// is queued.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error(
        "Target of {source_path} would overwrite the source; enable delete_source_after_convert or change the container or layout"
    )]
    TargetCollision { source_path: PathBuf },

    #[error("{first} and {second} both resolve to target {target}")]
    DuplicateTarget {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Creates [`JobOptions`] and [`Job`]s.
pub struct JobFactory {
    converter: Arc<dyn VideoConverter>,
    sink: Arc<dyn OutputSink>,
}

impl JobFactory {
    pub fn new(converter: Arc<dyn VideoConverter>, sink: Arc<dyn OutputSink>) -> Self {
        Self { converter, sink }
    }

    /// Builds the options of one job with a fresh id.
    pub fn make_job_options(
        task: TaskKind,
        source: &FileDescriptor,
        settings: &RunSettings,
    ) -> Result<JobOptions, FactoryError> {
        let task = match task {
            TaskKind::Probe => JobTask::Probe,
            TaskKind::IntegrityCheck => JobTask::IntegrityCheck,
            TaskKind::Convert => {
                let mut target = resolve_target(source, settings);
                if target == source.full_path {
                    if !settings.delete_source_after_convert {
                        return Err(FactoryError::TargetCollision {
                            source_path: source.full_path.clone(),
                        });
                    }
                    target = add_temp_token(&target);
                }
                JobTask::Convert(ConvertOptions {
                    target,
                    settings: settings.convert.clone(),
                    allow_clobber_existing: settings.allow_clobber_existing,
                    skip_convert_existing: settings.skip_convert_existing,
                    delete_source_after_convert: settings.delete_source_after_convert,
                    keep_invalid_convert_result: settings.keep_invalid_convert_result,
                    skip_video_codec_names: settings.skip_video_codec_names.clone(),
                })
            }
            TaskKind::Copy => {
                let target = target_parent(source, settings).join(source.file_name());
                if target == source.full_path {
                    return Err(FactoryError::TargetCollision {
                        source_path: source.full_path.clone(),
                    });
                }
                JobTask::Copy(CopyOptions {
                    target,
                    allow_clobber_existing: settings.allow_clobber_existing,
                    skip_existing: settings.skip_convert_existing,
                })
            }
        };

        Ok(JobOptions::new(task, source.clone()))
    }

    /// Builds options for every source, stopping at the first configuration
    /// error. Leftover temp-token files are ignored.
    pub fn make_all(
        task: TaskKind,
        sources: &[FileDescriptor],
        settings: &RunSettings,
    ) -> Result<Vec<JobOptions>, FactoryError> {
        let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut jobs = Vec::with_capacity(sources.len());

        for source in sources {
            if has_temp_token(&source.full_path) {
                debug!("Ignoring leftover temp file {}", source.full_path.display());
                continue;
            }

            let options = Self::make_job_options(task, source, settings)?;
            if let Some(target) = options.target_path() {
                let final_target = strip_temp_token(target).unwrap_or_else(|| target.to_path_buf());
                if let Some(first) = targets.insert(final_target.clone(), source.full_path.clone())
                {
                    return Err(FactoryError::DuplicateTarget {
                        target: final_target,
                        first,
                        second: source.full_path.clone(),
                    });
                }
            }
            jobs.push(options);
        }

        Ok(jobs)
    }

    /// Wraps persisted options in a runnable job.
    pub fn build(&self, options: JobOptions) -> Job {
        Job::new(options, Arc::clone(&self.converter), Arc::clone(&self.sink))
    }
}
