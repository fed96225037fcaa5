use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gdl_core::download::format_bytes;
use gdl_core::{
    BatchRequest, BatchSummary, Config, ConfigOverrides, DownloadOutcome, DownloadRequest,
    Downloader, LogLevel,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::validation::{OutputTarget, RunMode};
use crate::app::{exit_handler, terminal, validation};
use crate::cli::Args;

pub(crate) async fn run_gdl() -> Result<ProcessExit> {
    let args = Args::parse();

    let loaded = Config::load(args.config.as_deref(), &cli_overrides(&args))
        .context("Invalid configuration")?;

    let (default_level, force_cli_level) = terminal::resolve_log_level(
        args.verbose,
        args.quiet,
        loaded.config.log_level.filter_directive(),
    );
    let no_color = terminal::no_color_env_requested() || terminal::is_dumb_terminal();
    terminal::init_tracing(default_level, force_cli_level, no_color);

    for warning in &loaded.warnings {
        warn!("{warning}");
    }
    match &loaded.source {
        Some(path) => debug!(config = %path.display(), "Configuration loaded"),
        None => debug!("No configuration file found, using defaults"),
    }

    let mode = validation::resolve_run_mode(&args, &loaded.config.output_dir)?;

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let downloader = Downloader::new(loaded.config)?.with_progress(show_progress);

    tokio::select! {
        result = run_mode(&downloader, mode) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted. Run again with --resume to continue.");
            Ok(ProcessExit::Interrupted)
        }
    }
}

fn cli_overrides(args: &Args) -> ConfigOverrides {
    let log_level = if args.quiet {
        Some(LogLevel::Error)
    } else if args.verbose {
        Some(LogLevel::Debug)
    } else {
        None
    };
    ConfigOverrides {
        log_level,
        ..ConfigOverrides::default()
    }
}

async fn run_mode(downloader: &Downloader, mode: RunMode) -> Result<ProcessExit> {
    match mode {
        RunMode::Single {
            url,
            target,
            format,
            resume,
        } => run_single(downloader, url, target, format, resume).await,
        RunMode::Batch(request) => run_batch(downloader, &request).await,
    }
}

async fn run_single(
    downloader: &Downloader,
    url: String,
    target: OutputTarget,
    format: Option<String>,
    resume: bool,
) -> Result<ProcessExit> {
    let output: PathBuf = match target {
        OutputTarget::File(path) => path,
        OutputTarget::AutoName { dir } => {
            downloader
                .suggest_output_path(&url, format.as_deref(), &dir)
                .await?
        }
    };

    println!("Downloading: {url}");
    println!("Output: {}", output.display());

    let request = DownloadRequest::new(url, output)
        .with_format(format)
        .with_resume(resume);
    let outcome = downloader.download(&request).await?;

    info!(
        attempts = outcome.attempts,
        elapsed_ms = outcome.elapsed.as_millis(),
        "Download finished"
    );
    for line in single_summary_lines(&outcome) {
        println!("{line}");
    }
    Ok(ProcessExit::Success)
}

async fn run_batch(downloader: &Downloader, request: &BatchRequest) -> Result<ProcessExit> {
    println!("Starting batch download from: {}", request.urls_file.display());
    println!("Output directory: {}", request.output_dir.display());

    let summary = downloader.batch_download(request).await?;
    for line in batch_summary_lines(&summary) {
        println!("{line}");
    }

    Ok(exit_handler::determine_exit_outcome(
        summary.succeeded_count(),
        summary.failed_count(),
    ))
}

pub(crate) fn single_summary_lines(outcome: &DownloadOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "Download completed: {} ({})",
        outcome.path.display(),
        format_bytes(outcome.total_bytes)
    )];
    if outcome.resumed {
        lines.push(format!(
            "Resumed: {} added to the existing file",
            format_bytes(outcome.bytes_written)
        ));
    }
    if outcome.confirmation_unresolved {
        lines.push(
            "Warning: Google Drive returned its confirmation page without a token; \
             the saved file is likely that page, not the requested content"
                .to_string(),
        );
    }
    lines
}

pub(crate) fn batch_summary_lines(summary: &BatchSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Batch download completed: {}/{} files downloaded",
        summary.succeeded_count(),
        summary.total
    )];
    if !summary.failed.is_empty() {
        lines.push(format!("{} failed:", summary.failed_count()));
        lines.extend(
            summary
                .failed
                .iter()
                .map(|failure| format!("  {}: {}", failure.url, error_chain(&failure.error))),
        );
    }
    lines
}

/// Joins an error and its sources with `": "`.
fn error_chain(error: &dyn std::error::Error) -> String {
    std::iter::successors(Some(error), |e| e.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
