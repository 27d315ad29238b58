mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcodr_core::config::DEFAULT_LEDGER_FILE;
use transcodr_core::{
    load_config, load_default_config, plan_run, validate_config, BatchRunner, Config,
    ConsoleSink, FfmpegConverter, JobFactory, JobLedger, JobState, OutputSink, VideoConverter,
};

use cli::{Cli, Commands, RunArgs};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout carries the run output.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "transcodr=debug,transcodr_core=debug,transcodr_cli=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_default_config().context("Failed to load default config")?,
    };

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Status { ledger, json } => status(&config, &ledger, json).await,
        Commands::Check { file } => check(&config, &file).await,
    }
}

async fn run(mut config: Config, args: RunArgs) -> Result<()> {
    args.apply(&mut config.run);
    if let Some(name) = &args.name {
        config.ledger.name = Some(name.clone());
    }

    let ledger_path = match args.ledger.clone().or_else(|| config.ledger.path.clone()) {
        Some(path) => path,
        None if config.run.source_root.as_os_str().is_empty() => {
            bail!("Either --source or --ledger is required")
        }
        None => config.run.source_root.join(DEFAULT_LEDGER_FILE),
    };
    let resuming = ledger_path.exists();
    if !resuming {
        validate_config(&config).context("Configuration validation failed")?;
    }

    let converter = Arc::new(FfmpegConverter::new(config.converter.clone()));
    converter
        .validate()
        .await
        .context("ffmpeg is not usable")?;

    let name = config
        .ledger
        .name
        .clone()
        .unwrap_or_else(|| default_run_name(&config.run.source_root));
    let settings = config.run.clone();
    let flush_interval = Duration::from_secs(config.ledger.flush_interval_secs.max(1));
    let ledger = Arc::new(
        JobLedger::open(&ledger_path, flush_interval, || plan_run(&name, settings))
        .await
        .with_context(|| format!("Failed to open ledger {:?}", ledger_path))?,
    );

    if ledger.was_resumed() {
        let persisted = ledger.settings().await;
        if persisted != config.run {
            info!("Resuming with the settings stored in the ledger; new settings are ignored");
        }
        info!("Resuming run from {:?}", ledger_path);
    }

    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink::new());
    let factory = JobFactory::new(converter, Arc::clone(&sink));
    let runner = BatchRunner::new(Arc::clone(&ledger), factory, Arc::clone(&sink));
    let handle = runner.handle();

    let outcome = tokio::select! {
        result = runner.run() => Some(result),
        _ = shutdown_signal() => {
            handle.request_stop();
            warn!("Interrupted, saving ledger");
            None
        }
    };

    // Ledger first, then the sink.
    let flushed = ledger.shutdown().await;
    sink.shutdown();
    flushed.context("Failed to save ledger")?;

    match outcome {
        Some(result) => {
            let summary = result.context("Run aborted")?;
            info!(
                "Finished: {} succeeded, {} skipped, {} failed",
                summary.succeeded, summary.skipped, summary.failed
            );
            Ok(())
        }
        None => {
            info!("Ledger saved to {:?}; run again to resume", ledger_path);
            Ok(())
        }
    }
}

async fn status(config: &Config, ledger_path: &Path, json: bool) -> Result<()> {
    let interval = Duration::from_secs(config.ledger.flush_interval_secs.max(1));
    let ledger = JobLedger::load(ledger_path, interval)
        .await
        .with_context(|| format!("Failed to load ledger {:?}", ledger_path))?;
    let snapshot = ledger.snapshot().await;
    ledger.shutdown().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let stats = &snapshot.stats;
    println!("Run:       {} ({})", snapshot.name, snapshot.ledger_id);
    println!("Created:   {}", snapshot.created_at.to_rfc3339());
    println!("Updated:   {}", snapshot.updated_at.to_rfc3339());
    println!("Task:      {}", snapshot.settings.task);
    println!(
        "Jobs:      {} total, {} completed, {} failed, {} remaining",
        stats.num_jobs,
        stats.num_completed_jobs,
        stats.num_failed_jobs,
        stats.num_remaining_jobs()
    );
    println!("Done:      {:.1}%", stats.percent_done);
    if stats.size_before > 0 {
        println!(
            "Size:      {} -> {} ({:+.1}%)",
            transcodr_core::runner::format_bytes(stats.size_before),
            transcodr_core::runner::format_bytes(stats.size_after),
            stats.percent_size_change
        );
    }

    let failed: Vec<_> = snapshot
        .jobs
        .iter()
        .filter(|j| j.state == JobState::Error)
        .collect();
    if !failed.is_empty() {
        println!("Failed:");
        for job in failed {
            let reason = job
                .failure_reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let detail = job
                .result
                .as_ref()
                .and_then(|r| r.failure_detail.clone())
                .unwrap_or_default();
            println!(
                "  {} {} [{}] {}",
                job.job_id,
                job.source.full_path.display(),
                reason,
                detail
            );
        }
    }
    Ok(())
}

async fn check(config: &Config, file: &Path) -> Result<()> {
    let converter = FfmpegConverter::new(config.converter.clone());
    let outcome = converter.check_integrity(file).await;

    if let Some(metadata) = &outcome.metadata {
        println!(
            "Format:    {}",
            metadata.format_name.as_deref().unwrap_or("unknown")
        );
        if let Some(duration) = metadata.known_duration_secs() {
            println!("Duration:  {:.1}s", duration);
        }
        for stream in &metadata.streams {
            println!(
                "Stream {}:  {} {}",
                stream.index,
                stream.codec_type,
                stream.codec_name.as_deref().unwrap_or("?")
            );
        }
    }

    if !outcome.success {
        bail!(
            "Could not check {}: {}",
            file.display(),
            outcome.error.unwrap_or_default()
        );
    }
    println!("Verdict:   {}", outcome.verdict.describe());
    if !outcome.verdict.is_good {
        bail!("{} failed the integrity check", file.display());
    }
    Ok(())
}

fn default_run_name(source_root: &Path) -> String {
    source_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| source_root.display().to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
