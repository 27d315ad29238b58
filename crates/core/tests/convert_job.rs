//! Job-level integration tests.
//!
//! Each test runs one job against a `MockConverter` inside a temp directory
//! and asserts on the returned result and the files left on disk:
//! - Target collisions, temp-token renames and source deletion
//! - Source and target integrity gates
//! - Codec and existing-target skips
//! - Probe, integrity-check and copy tasks
//! - Cleanup of interrupted jobs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tokio_test::assert_ok;

use transcodr_core::{
    config::{RunSettings, TargetLayout},
    converter::IntegrityVerdict,
    factory::JobFactory,
    fs::FileDescriptor,
    job::{ConvertOptions, FailureReason, Job, JobOptions, JobResult, JobState, JobTask, TaskKind},
    output::OutputSink,
    testing::{fixtures, MemorySink, MockConverter},
};

const SOURCE_BYTES: usize = 1000;

struct Harness {
    dir: TempDir,
    converter: Arc<MockConverter>,
    sink: Arc<MemorySink>,
    settings: RunSettings,
}

impl Harness {
    fn new() -> Self {
        Self::with_sink(MemorySink::new())
    }

    fn with_sink(sink: MemorySink) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let settings = RunSettings {
            source_root: dir.path().join("in"),
            target_root: Some(dir.path().join("out")),
            ..Default::default()
        };
        Self {
            dir,
            converter: Arc::new(MockConverter::new()),
            sink: Arc::new(sink),
            settings,
        }
    }

    fn root(&self) -> &Path {
        &self.settings.source_root
    }

    async fn source(&self, rel: &str) -> FileDescriptor {
        let path = self.root().join(rel);
        fixtures::write_media_file(&path, SOURCE_BYTES).await;
        FileDescriptor::new(&path, self.root(), SOURCE_BYTES as u64)
    }

    fn factory(&self) -> JobFactory {
        JobFactory::new(
            self.converter.clone(),
            self.sink.clone() as Arc<dyn OutputSink>,
        )
    }

    fn job(&self, task: TaskKind, source: &FileDescriptor) -> Job {
        let options = JobFactory::make_job_options(task, source, &self.settings)
            .expect("Failed to build job options");
        self.factory().build(options)
    }

    async fn run(&self, task: TaskKind, source: &FileDescriptor) -> (JobResult, Job) {
        let job = self.job(task, source);
        let result = job.execute().await.expect("job returned an error");
        (result, job)
    }

    /// Every file under the temp dir, relative to it.
    fn files(&self) -> BTreeSet<PathBuf> {
        fn walk(dir: &Path, base: &Path, out: &mut BTreeSet<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, base, out);
                } else {
                    out.insert(path.strip_prefix(base).unwrap().to_path_buf());
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(self.dir.path(), self.dir.path(), &mut out);
        out
    }
}

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

#[tokio::test]
async fn test_source_equal_to_target_fails_without_touching_files() {
    let h = Harness::new();
    let source = h.source("movie.mkv").await;

    let options = JobOptions::new(
        JobTask::Convert(ConvertOptions {
            target: source.full_path.clone(),
            settings: h.settings.convert.clone(),
            allow_clobber_existing: true,
            skip_convert_existing: false,
            delete_source_after_convert: false,
            keep_invalid_convert_result: false,
            skip_video_codec_names: Vec::new(),
        }),
        source.clone(),
    );
    let result = h.factory().build(options).execute().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_reason, Some(FailureReason::SourceIsTarget));
    assert_eq!(h.files(), set(&["in/movie.mkv"]));
    assert_eq!(h.converter.conversion_count().await, 0);
}

#[tokio::test]
async fn test_convert_success_writes_target_next_to_source() {
    let h = Harness::new();
    let source = h.source("show/ep1.avi").await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success, "{:?}", result.failure_detail);
    assert!(!result.skipped);
    assert_eq!(result.target_path, Some(h.root().join("show/ep1.mkv")));
    assert_eq!(result.size_before, 1000);
    assert_eq!(result.size_after, 512);
    assert_eq!(result.size_delta, -488);
    assert!(result.source_verdict.as_ref().unwrap().is_good);
    assert!(result.target_verdict.as_ref().unwrap().is_good);
    assert_eq!(h.files(), set(&["in/show/ep1.avi", "in/show/ep1.mkv"]));

    let conversions = h.converter.recorded_conversions().await;
    assert_eq!(conversions.len(), 1);
    assert_eq!(conversions[0].request.source, source.full_path);
}

#[tokio::test]
async fn test_convert_mirror_layout_creates_target_dirs() {
    let mut h = Harness::new();
    h.settings.layout = TargetLayout::MirrorRelative;
    h.settings.convert.container = "mp4".to_string();
    let source = h.source("a/b/clip.mov").await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    assert_eq!(h.files(), set(&["in/a/b/clip.mov", "out/a/b/clip.mp4"]));
}

#[tokio::test]
async fn test_delete_source_leaves_only_target() {
    let mut h = Harness::new();
    h.settings.delete_source_after_convert = true;
    let source = h.source("ep1.avi").await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    assert_eq!(h.files(), set(&["in/ep1.mkv"]));
}

#[tokio::test]
async fn test_bad_source_never_creates_target() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    h.converter
        .set_verdict(&source.full_path, fixtures::bad_verdict())
        .await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(!result.success);
    assert_eq!(result.failure_reason, Some(FailureReason::SourceCorrupt));
    assert!(result.failure_detail.unwrap().contains("missing video stream"));
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
    assert_eq!(h.converter.conversion_count().await, 0);
}

#[tokio::test]
async fn test_source_check_error_is_its_own_reason() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    h.converter.fail_integrity_check(&source.full_path).await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert_eq!(
        result.failure_reason,
        Some(FailureReason::SourceIntegrityCheckFailed)
    );
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
}

#[tokio::test]
async fn test_bad_target_is_deleted() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    h.converter
        .set_verdict(h.root().join("ep1.mkv"), fixtures::bad_verdict())
        .await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(!result.success);
    assert_eq!(result.failure_reason, Some(FailureReason::TargetCorrupt));
    assert_eq!(result.size_after, 0);
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
}

#[tokio::test]
async fn test_bad_target_is_kept_on_request() {
    let mut h = Harness::new();
    h.settings.keep_invalid_convert_result = true;
    let source = h.source("ep1.avi").await;
    h.converter
        .set_verdict(h.root().join("ep1.mkv"), fixtures::bad_verdict())
        .await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert_eq!(result.failure_reason, Some(FailureReason::TargetCorrupt));
    assert_eq!(h.files(), set(&["in/ep1.avi", "in/ep1.mkv"]));
}

#[tokio::test]
async fn test_in_place_conversion_goes_through_temp_token() {
    let mut h = Harness::new();
    h.settings.delete_source_after_convert = true;
    let source = h.source("movie.mkv").await;

    let job = h.job(TaskKind::Convert, &source);
    let target = job.options().target_path().unwrap().to_path_buf();
    assert_eq!(target, h.root().join(".transcodr-tmp.movie.mkv"));

    let result = job.execute().await.unwrap();

    assert!(result.success, "{:?}", result.failure_detail);
    assert_eq!(result.target_path, Some(source.full_path.clone()));
    assert_eq!(h.files(), set(&["in/movie.mkv"]));

    let content = tokio::fs::read(&source.full_path).await.unwrap();
    assert_eq!(content, vec![b'x'; 512]);
    assert_eq!(
        h.converter.recorded_conversions().await[0].request.target,
        target
    );
}

#[tokio::test]
async fn test_skip_by_video_codec() {
    let mut h = Harness::new();
    h.settings.skip_video_codec_names = vec!["HEVC".to_string()];
    let source = h.source("ep1.mkv").await;
    h.converter
        .set_metadata(
            &source.full_path,
            fixtures::metadata_with_video_codec(&source.full_path, "hevc"),
        )
        .await;
    h.settings.convert.container = "mp4".to_string();

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    assert!(result.skipped);
    assert!(result.skip_reason.unwrap().contains("hevc"));
    assert_eq!(h.converter.conversion_count().await, 0);
    assert_eq!(h.files(), set(&["in/ep1.mkv"]));
}

#[tokio::test]
async fn test_codec_skip_without_video_stream_fails() {
    let mut h = Harness::new();
    h.settings.skip_video_codec_names = vec!["hevc".to_string()];
    let source = h.source("song.avi").await;
    h.converter
        .set_metadata(
            &source.full_path,
            fixtures::audio_only_metadata(&source.full_path),
        )
        .await;
    h.converter
        .set_verdict(&source.full_path, IntegrityVerdict::good())
        .await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert_eq!(result.failure_reason, Some(FailureReason::NoVideoStream));
    assert_eq!(h.converter.conversion_count().await, 0);
}

#[tokio::test]
async fn test_skip_existing_leaves_both_files_alone() {
    let mut h = Harness::new();
    h.settings.skip_convert_existing = true;
    let source = h.source("ep1.avi").await;
    let existing = h.root().join("ep1.mkv");
    tokio::fs::write(&existing, b"old").await.unwrap();

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    assert!(result.skipped);
    assert_eq!(tokio::fs::read(&existing).await.unwrap(), b"old");
    assert_eq!(
        tokio::fs::read(&source.full_path).await.unwrap().len(),
        SOURCE_BYTES
    );
    assert_eq!(h.converter.conversion_count().await, 0);
}

#[tokio::test]
async fn test_existing_target_without_policy_fails() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    let existing = h.root().join("ep1.mkv");
    tokio::fs::write(&existing, b"old").await.unwrap();

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert_eq!(result.failure_reason, Some(FailureReason::TargetExists));
    assert_eq!(tokio::fs::read(&existing).await.unwrap(), b"old");
}

#[tokio::test]
async fn test_clobber_replaces_existing_target() {
    let mut h = Harness::new();
    h.settings.allow_clobber_existing = true;
    let source = h.source("ep1.avi").await;
    let existing = h.root().join("ep1.mkv");
    tokio::fs::write(&existing, b"old").await.unwrap();

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    assert_eq!(tokio::fs::read(&existing).await.unwrap().len(), 512);
}

#[tokio::test]
async fn test_failed_transcode_removes_partial_target() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    h.converter.fail_convert_for(&source.full_path).await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert_eq!(result.failure_reason, Some(FailureReason::ConvertFailed));
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
}

#[tokio::test]
async fn test_progress_is_rendered_on_progressive_sink() {
    let h = Harness::with_sink(MemorySink::progressive());
    let source = h.source("ep1.avi").await;

    let (result, _) = h.run(TaskKind::Convert, &source).await;

    assert!(result.success);
    let out = h.sink.contents();
    assert!(out.contains("\r=====>"), "{:?}", out);
    assert!(out.contains("%25"));
    assert!(out.contains("%100"));
}

#[tokio::test]
async fn test_no_progress_on_plain_sink() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;

    h.run(TaskKind::Convert, &source).await;

    assert!(!h.sink.contents().contains('%'));
}

#[tokio::test]
async fn test_probe_task() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;

    let (result, job) = h.run(TaskKind::Probe, &source).await;

    assert!(result.success);
    assert!(job.options().target_path().is_none());
    assert_eq!(
        result.source_metadata.unwrap().format_name.as_deref(),
        Some("matroska")
    );
    assert_eq!(result.size_after, result.size_before);
    assert_eq!(result.size_delta, 0);
}

#[tokio::test]
async fn test_probe_failure() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    h.converter.fail_probe(&source.full_path).await;

    let (result, _) = h.run(TaskKind::Probe, &source).await;

    assert_eq!(result.failure_reason, Some(FailureReason::ProbeFailed));
}

#[tokio::test]
async fn test_integrity_check_task() {
    let h = Harness::new();
    let good = h.source("good.avi").await;
    let bad = h.source("bad.avi").await;
    h.converter
        .set_verdict(&bad.full_path, fixtures::bad_verdict())
        .await;

    let (result, _) = h.run(TaskKind::IntegrityCheck, &good).await;
    assert!(result.success);
    assert!(result.source_verdict.unwrap().is_good);

    let (result, _) = h.run(TaskKind::IntegrityCheck, &bad).await;
    assert_eq!(result.failure_reason, Some(FailureReason::SourceCorrupt));
    assert_eq!(h.files(), set(&["in/bad.avi", "in/good.avi"]));
}

#[tokio::test]
async fn test_copy_task() {
    let mut h = Harness::new();
    h.settings.layout = TargetLayout::Flat;
    let source = h.source("deep/dir/ep1.avi").await;

    let (result, _) = h.run(TaskKind::Copy, &source).await;

    assert!(result.success);
    assert_eq!(result.size_after, SOURCE_BYTES as u64);
    assert_eq!(h.files(), set(&["in/deep/dir/ep1.avi", "out/ep1.avi"]));
    assert_eq!(h.converter.conversion_count().await, 0);
}

#[tokio::test]
async fn test_cleanup_removes_target_of_interrupted_job() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;

    let mut options = JobFactory::make_job_options(TaskKind::Convert, &source, &h.settings)
        .expect("options");
    options.mark_running();
    let target = options.target_path().unwrap().to_path_buf();
    tokio::fs::write(&target, b"partial").await.unwrap();
    assert_eq!(options.state, JobState::Running);

    let deleted = h.factory().build(options).cleanup_after_interruption().await;

    assert_eq!(deleted, vec![target]);
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
}

#[tokio::test]
async fn test_cleanup_keeps_target_the_job_never_wrote() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    let existing = h.root().join("ep1.mkv");
    tokio::fs::write(&existing, b"someone else's").await.unwrap();

    let (result, job) = h.run(TaskKind::Convert, &source).await;
    assert_eq!(result.failure_reason, Some(FailureReason::TargetExists));

    let mut options = job.options().clone();
    options.record(result);
    let deleted = h.factory().build(options).cleanup_after_interruption().await;

    assert!(deleted.is_empty());
    assert!(existing.exists());
}

#[tokio::test]
async fn test_cleanup_after_unexpected_keeps_older_user_file() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;
    let existing = h.root().join("ep1.mkv");
    tokio::fs::write(&existing, b"someone else's").await.unwrap();
    let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&existing)
        .unwrap()
        .set_modified(an_hour_ago)
        .unwrap();

    let mut options = JobFactory::make_job_options(TaskKind::Convert, &source, &h.settings)
        .expect("options");
    options.mark_running();
    options.record(JobResult::failure(FailureReason::Unexpected, "panic: boom", 0));
    let deleted = h.factory().build(options).cleanup_after_interruption().await;

    assert!(deleted.is_empty());
    assert_eq!(tokio::fs::read(&existing).await.unwrap(), b"someone else's");
}

#[tokio::test]
async fn test_cleanup_after_unexpected_removes_target_written_by_job() {
    let h = Harness::new();
    let source = h.source("ep1.avi").await;

    let mut options = JobFactory::make_job_options(TaskKind::Convert, &source, &h.settings)
        .expect("options");
    options.mark_running();
    let target = options.target_path().unwrap().to_path_buf();
    tokio::fs::write(&target, b"partial").await.unwrap();
    options.record(JobResult::failure(FailureReason::Unexpected, "panic: boom", 0));

    let deleted = h.factory().build(options).cleanup_after_interruption().await;

    assert_eq!(deleted, vec![target]);
    assert_eq!(h.files(), set(&["in/ep1.avi"]));
}

#[tokio::test]
async fn test_cleanup_never_deletes_source_behind_temp_token() {
    let mut h = Harness::new();
    h.settings.delete_source_after_convert = true;
    let source = h.source("movie.mkv").await;

    let mut options = JobFactory::make_job_options(TaskKind::Convert, &source, &h.settings)
        .expect("options");
    options.mark_running();
    let temp = options.target_path().unwrap().to_path_buf();
    tokio::fs::write(&temp, b"partial").await.unwrap();

    let deleted = h.factory().build(options).cleanup_after_interruption().await;

    assert_eq!(deleted, vec![temp]);
    assert_eq!(h.files(), set(&["in/movie.mkv"]));
    assert_ok!(tokio::fs::metadata(&source.full_path).await);
}
