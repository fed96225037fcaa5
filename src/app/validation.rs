use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use gdl_core::{BatchRequest, extract_file_id, validate_url};

use crate::cli::Args;

/// Where a single download is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputTarget {
    File(PathBuf),
    /// Server-suggested name inside `dir`.
    AutoName { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunMode {
    Single {
        url: String,
        target: OutputTarget,
        format: Option<String>,
        resume: bool,
    },
    Batch(BatchRequest),
}

/// Checks argument combinations and resolves what to run.
///
/// `config_output_dir` is the batch directory used when `--output-dir` is absent.
pub(crate) fn resolve_run_mode(args: &Args, config_output_dir: &Path) -> Result<RunMode> {
    if let Some(url) = &args.url {
        if !validate_url(url) || extract_file_id(url).is_none() {
            bail!("Invalid Google Drive URL: {url}");
        }

        let target = if args.auto_name {
            OutputTarget::AutoName {
                dir: args.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            }
        } else if let Some(output) = &args.output {
            OutputTarget::File(output.clone())
        } else {
            bail!(
                "Output path is required for single downloads.\n  \
                 Use --output PATH or --auto-name"
            );
        };

        return Ok(RunMode::Single {
            url: url.clone(),
            target,
            format: args.format.clone(),
            resume: args.resume,
        });
    }

    let Some(urls_file) = &args.batch else {
        bail!("Either --url or --batch is required");
    };
    if !urls_file.is_file() {
        bail!("Batch file not found: {}", urls_file.display());
    }

    Ok(RunMode::Batch(BatchRequest {
        urls_file: urls_file.clone(),
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| config_output_dir.to_path_buf()),
        export_format: args.format.clone(),
        resume: args.resume,
    }))
}
